//! Built-in directives.
//!
//! `validate` and `resolveValueAndMerge` are the mandatory pair every field
//! runs through; the rest are opt-in. All of them are attached to the
//! global class, so any class can override one by attaching a directive
//! with the same name.

mod control;
mod output;

pub use control::{CacheControlDirective, ConditionDirective};
pub use output::{ApplyDirectivesDirective, CaseDirective, DefaultDirective, ExportDirective};

use crate::context::{DataFields, IdsDataFields};
use crate::directive::{
    DirectiveInstance, DirectiveResolver, PipelinePosition, SharedDirective, StageContext,
};
use crate::pipeline::SucceedingStages;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// Returns every built-in directive.
#[must_use]
pub fn builtin_directives() -> Vec<SharedDirective> {
    vec![
        Arc::new(ValidateDirective),
        Arc::new(ResolveValueAndMergeDirective),
        Arc::new(ConditionDirective::skip()),
        Arc::new(ConditionDirective::include()),
        Arc::new(CacheControlDirective),
        Arc::new(CaseDirective::upper()),
        Arc::new(CaseDirective::lower()),
        Arc::new(CaseDirective::title()),
        Arc::new(DefaultDirective),
        Arc::new(ExportDirective),
        Arc::new(ApplyDirectivesDirective),
    ]
}

/// Whether a value counts as true for a conditional field.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(elements) => !elements.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

// ============================================================================
// validate
// ============================================================================

/// Drops fields that fail schema validation from the rest of the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateDirective;

impl ValidateDirective {
    fn validate_conditional(cx: &mut StageContext<'_, '_>, fields: &DataFields) {
        for (condition, conditional) in &fields.conditional {
            if fields.direct.contains(condition) {
                for field in &conditional.direct {
                    cx.validate_field(field);
                }
                Self::validate_conditional(cx, conditional);
            }
        }
    }
}

impl DirectiveResolver for ValidateDirective {
    fn name(&self) -> &str {
        "validate"
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Front
    }

    fn description(&self) -> Option<String> {
        Some("Checks fields and their arguments against the schema".to_string())
    }

    fn execute(
        &self,
        _instance: &DirectiveInstance,
        fields: &IdsDataFields,
        succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        let mut checked: FxHashMap<&str, bool> = FxHashMap::default();
        for (id, data_fields) in fields {
            for field in &data_fields.direct {
                let valid = match checked.get(field.as_str()) {
                    Some(valid) => *valid,
                    None => {
                        let valid = cx.validate_field(field);
                        checked.insert(field, valid);
                        valid
                    }
                };
                if !valid {
                    succeeding.remove_field(id, field);
                }
            }
            Self::validate_conditional(cx, data_fields);
        }
    }
}

// ============================================================================
// resolveValueAndMerge
// ============================================================================

/// Resolves field values into the object store.
///
/// Conditional fields are resolved in place when their condition field
/// resolves to a truthy value. Directives written on a conditional field
/// are not run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveValueAndMergeDirective;

impl ResolveValueAndMergeDirective {
    fn resolve(cx: &mut StageContext<'_, '_>, id: &str, fields: &DataFields, conditional: bool) {
        for field in &fields.direct {
            if conditional && !cx.validate_field(field) {
                continue;
            }
            match cx.resolve_value(id, field) {
                Ok(value) => {
                    let truthy = is_truthy(&value);
                    cx.set_db_value(id, field, value);
                    if truthy {
                        if let Some(nested) = fields.conditional.get(field) {
                            Self::resolve(cx, id, nested, true);
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        cx.item_error(id, field, error);
                    }
                    cx.set_db_value(id, field, Value::Null);
                }
            }
        }
    }
}

impl DirectiveResolver for ResolveValueAndMergeDirective {
    fn name(&self) -> &str {
        "resolveValueAndMerge"
    }

    fn description(&self) -> Option<String> {
        Some("Resolves field values for every object".to_string())
    }

    fn execute(
        &self,
        _instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        for (id, data_fields) in fields {
            Self::resolve(cx, id, data_fields, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!([0])));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!({})));
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let directives = builtin_directives();
        let mut names: Vec<String> = directives
            .iter()
            .map(|d| d.name().to_ascii_lowercase())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), directives.len());
        assert!(directives
            .iter()
            .any(|d| d.name() == "skip" && !d.is_repeatable()));
    }
}
