//! Directives that shape resolved values.

use crate::context::IdsDataFields;
use crate::directive::{DirectiveInstance, DirectiveResolver, PipelinePosition, StageContext};
use crate::interpreter::SchemaArgs;
use crate::pipeline::SucceedingStages;
use crate::schema::{ArgDefinition, ScalarType, TypeRef};
use serde_json::Value;

/// Changes the case of string values, and of strings inside lists.
#[derive(Debug, Clone, Copy)]
pub struct CaseDirective {
    name: &'static str,
    convert: fn(&str) -> String,
}

impl CaseDirective {
    #[must_use]
    pub fn upper() -> Self {
        Self {
            name: "upperCase",
            convert: str::to_uppercase,
        }
    }

    #[must_use]
    pub fn lower() -> Self {
        Self {
            name: "lowerCase",
            convert: str::to_lowercase,
        }
    }

    /// Capitalizes the first letter of every word.
    #[must_use]
    pub fn title() -> Self {
        Self {
            name: "titleCase",
            convert: title_case,
        }
    }

    fn apply(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(text) => Some(Value::String((self.convert)(text))),
            Value::Array(elements) => elements
                .iter()
                .map(|element| match element {
                    Value::Null => Some(Value::Null),
                    other => self.apply(other),
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            _ => None,
        }
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

impl DirectiveResolver for CaseDirective {
    fn name(&self) -> &str {
        self.name
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Back
    }

    fn execute(
        &self,
        _instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        for (id, data_fields) in fields {
            for field in &data_fields.direct {
                let Some(value) = cx.db_value(id, field).cloned() else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                match self.apply(&value) {
                    Some(converted) => cx.set_db_value(id, field, converted),
                    None => cx.item_warning(
                        id,
                        field,
                        format!(
                            "Directive '{}' can only be applied to strings, so the value of field '{field}' has been left unchanged",
                            self.name
                        ),
                    ),
                }
            }
        }
    }
}

/// `default(value:)`: fills in missing and null values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDirective;

impl DirectiveResolver for DefaultDirective {
    fn name(&self) -> &str {
        "default"
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Back
    }

    fn args(&self) -> Vec<ArgDefinition> {
        vec![ArgDefinition::new("value", TypeRef::scalar(ScalarType::Mixed)).mandatory()]
    }

    fn execute(
        &self,
        instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        for (id, data_fields) in fields {
            let missing: Vec<&String> = data_fields
                .direct
                .iter()
                .filter(|field| cx.db_value(id, field).map_or(true, Value::is_null))
                .collect();
            if missing.is_empty() {
                continue;
            }
            let evaluated = cx.directive_args(instance, id);
            for field in missing {
                for error in &evaluated.errors {
                    cx.item_error(id, field, error.clone());
                }
                if let Some(value) = evaluated.args.get("value") {
                    cx.set_db_value(id, field, value.clone());
                }
            }
        }
    }
}

/// `export(as:)`: copies values into a response variable.
///
/// A single value is exported as is; several values become a list in
/// object order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportDirective;

impl DirectiveResolver for ExportDirective {
    fn name(&self) -> &str {
        "export"
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Back
    }

    fn args(&self) -> Vec<ArgDefinition> {
        vec![ArgDefinition::new("as", TypeRef::scalar(ScalarType::String)).mandatory()]
    }

    fn validate(&self, args: &SchemaArgs, _fields: &[String]) -> Vec<String> {
        match args.ready("as").and_then(Value::as_str) {
            Some(name) if name.is_empty() => vec!["Argument 'as' must not be empty".to_string()],
            None => vec!["Argument 'as' must be a static value".to_string()],
            _ => Vec::new(),
        }
    }

    fn execute(
        &self,
        instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        let Some(name) = instance.args.ready("as").and_then(Value::as_str) else {
            return;
        };
        let mut values: Vec<Value> = fields
            .iter()
            .flat_map(|(id, data_fields)| {
                data_fields
                    .direct
                    .iter()
                    .map(move |field| (id.as_str(), field.as_str()))
            })
            .map(|(id, field)| cx.db_value(id, field).cloned().unwrap_or(Value::Null))
            .collect();
        let value = if values.len() == 1 {
            values.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(values)
        };
        cx.state.variables.insert(name.to_string(), value);
    }
}

/// `applyDirectives(directives:)`: runs more directives over the resolved
/// values in the next drain iteration.
///
/// Directives with arguments must be quoted, e.g.
/// `applyDirectives(directives:[upperCase;"default(value:none)"])`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyDirectivesDirective;

impl ApplyDirectivesDirective {
    fn directives(args: &SchemaArgs) -> Vec<String> {
        args.ready("directives")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DirectiveResolver for ApplyDirectivesDirective {
    fn name(&self) -> &str {
        "applyDirectives"
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Back
    }

    fn args(&self) -> Vec<ArgDefinition> {
        vec![ArgDefinition::new(
            "directives",
            TypeRef::list(TypeRef::scalar(ScalarType::String)),
        )
        .mandatory()]
    }

    fn validate(&self, args: &SchemaArgs, _fields: &[String]) -> Vec<String> {
        if Self::directives(args).is_empty() {
            vec!["Argument 'directives' must list at least one directive".to_string()]
        } else {
            Vec::new()
        }
    }

    fn execute(
        &self,
        instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        let nested = Self::directives(&instance.args);
        for (id, data_fields) in fields {
            for field in &data_fields.direct {
                let field = cx.syntax().replace_field_directives(field, &nested);
                cx.enqueue_field(id, &field);
            }
        }
    }
}
