//! The field query interpreter.
//!
//! Turns raw field and directive strings into typed arguments, twice: once
//! when the field is validated against the schema, with no result item at
//! hand, and once per result item, when arguments that are themselves
//! fields can be evaluated. Parse results are memoized by raw string for
//! the lifetime of the request.

use crate::cast::{cast_value, display_value};
use crate::resolver::FieldArgs;
use crate::schema::{ArgDefinition, TypeRef};
use fql_syntax::{ArgValue, QueryError, QueryResult, QuerySyntax};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// An argument value whose nested fields are still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredArg {
    Value(Value),
    /// A field evaluated against the result item.
    Field(String),
    Array(Vec<DeferredArg>),
}

impl DeferredArg {
    /// Returns the value if no nested field is involved.
    #[must_use]
    pub fn as_static(&self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value.clone()),
            Self::Field(_) => None,
            Self::Array(elements) => elements
                .iter()
                .map(Self::as_static)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

/// An argument after schema-time resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgInput {
    /// Resolved and cast.
    Ready(Value),
    /// Depends on the result item; cast once evaluated.
    PerItem { arg: DeferredArg, ty: TypeRef },
}

/// Arguments of a field or directive, resolved at schema time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaArgs {
    pub values: IndexMap<String, ArgInput>,
    /// Fields used as argument values, to be validated by the caller.
    pub nested_fields: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub deprecations: Vec<String>,
}

impl SchemaArgs {
    /// Returns a resolved argument value. Per-item arguments are `None`.
    #[must_use]
    pub fn ready(&self, name: &str) -> Option<&Value> {
        match self.values.get(name)? {
            ArgInput::Ready(value) => Some(value),
            ArgInput::PerItem { .. } => None,
        }
    }

    #[cfg(test)]
    fn is_per_item(&self) -> bool {
        self.values
            .values()
            .any(|input| matches!(input, ArgInput::PerItem { .. }))
    }
}

/// Arguments evaluated for one result item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemArgs {
    pub args: FieldArgs,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Parses and resolves field arguments for one request.
pub struct FieldQueryInterpreter {
    syntax: Arc<QuerySyntax>,
    variables: IndexMap<String, Value>,
    field_names: FxHashMap<String, QueryResult<String>>,
    static_args: FxHashMap<String, IndexMap<String, String>>,
    directives: FxHashMap<String, (Vec<String>, Vec<QueryError>)>,
}

impl FieldQueryInterpreter {
    /// Creates an interpreter resolving `$name` against `variables`.
    pub fn new(syntax: Arc<QuerySyntax>, variables: IndexMap<String, Value>) -> Self {
        Self {
            syntax,
            variables,
            field_names: FxHashMap::default(),
            static_args: FxHashMap::default(),
            directives: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn syntax(&self) -> &QuerySyntax {
        &self.syntax
    }

    #[must_use]
    pub fn variables(&self) -> &IndexMap<String, Value> {
        &self.variables
    }

    /// Returns the lower-cased field name, memoized.
    pub fn field_name(&mut self, field: &str) -> QueryResult<String> {
        if let Some(name) = self.field_names.get(field) {
            return name.clone();
        }
        let name = self.syntax.field_name(field);
        self.field_names.insert(field.to_string(), name.clone());
        name
    }

    /// Returns the raw arguments, memoized.
    ///
    /// Values are never interpreted here: this runs while choosing the
    /// resolver for a field, before its schema is known.
    pub fn static_field_arguments(&mut self, field: &str) -> IndexMap<String, String> {
        if let Some(args) = self.static_args.get(field) {
            return args.clone();
        }
        let args = self.syntax.static_field_arguments(field);
        self.static_args.insert(field.to_string(), args.clone());
        args
    }

    /// Returns the directive tokens of a field and the errors found while
    /// listing them, memoized.
    pub fn field_directives(&mut self, field: &str) -> (Vec<String>, Vec<QueryError>) {
        if let Some(directives) = self.directives.get(field) {
            return directives.clone();
        }
        let directives = self.syntax.list_field_directives(field);
        self.directives
            .insert(field.to_string(), directives.clone());
        directives
    }

    /// Resolves the arguments of a field or directive against their
    /// declarations.
    ///
    /// Variables are substituted and arrays converted. Values are cast to
    /// the declared type; a failed cast is a warning and drops the
    /// argument. Nested fields are left for [`Self::extract_field_arguments_for_result_item`]
    /// and listed in `nested_fields` for validation.
    pub fn extract_field_arguments_for_schema(
        &mut self,
        definitions: &[ArgDefinition],
        field: &str,
    ) -> SchemaArgs {
        let mut out = SchemaArgs::default();
        let raw_args = self.static_field_arguments(field);

        for (position, (key, raw)) in raw_args.iter().enumerate() {
            let definition = if key.bytes().all(|b| b.is_ascii_digit()) {
                key.parse::<usize>()
                    .ok()
                    .filter(|&index| index == position)
                    .and_then(|index| definitions.get(index))
            } else {
                definitions.iter().find(|d| d.name == *key)
            };
            let Some(definition) = definition else {
                out.warnings.push(format!(
                    "Argument '{key}' does not exist for field '{field}', so it has been ignored"
                ));
                continue;
            };
            if out.values.contains_key(&definition.name) {
                out.warnings.push(format!(
                    "Argument '{}' in field '{field}' has been provided more than once, so the repeated value has been ignored",
                    definition.name
                ));
                continue;
            }

            let parsed = match ArgValue::parse(&self.syntax, raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    out.errors.push(error.message);
                    continue;
                }
            };
            let deferred = match self.resolve_static(&parsed) {
                Ok(deferred) => deferred,
                Err(variable) => {
                    out.warnings.push(format!(
                        "Variable '{}{variable}' has not been defined, so argument '{}' has been ignored",
                        char::from(self.syntax.variable_prefix),
                        definition.name
                    ));
                    continue;
                }
            };

            match deferred.as_static() {
                Some(Value::Null) => {}
                Some(value) => match cast_value(&value, &definition.ty) {
                    Some(cast) => {
                        out.values
                            .insert(definition.name.clone(), ArgInput::Ready(cast));
                    }
                    None => out.warnings.push(cast_failure(&value, definition)),
                },
                None => {
                    collect_nested_fields(&parsed, &mut out.nested_fields);
                    out.values.insert(
                        definition.name.clone(),
                        ArgInput::PerItem {
                            arg: deferred,
                            ty: definition.ty.clone(),
                        },
                    );
                }
            }
        }

        for definition in definitions {
            if out.values.contains_key(&definition.name) {
                continue;
            }
            if let Some(default) = &definition.default {
                out.values
                    .insert(definition.name.clone(), ArgInput::Ready(default.clone()));
            } else if definition.mandatory {
                out.errors.push(format!(
                    "Mandatory argument '{}' in field '{field}' has not been provided",
                    definition.name
                ));
            }
        }

        trace!(field, args = out.values.len(), "extracted schema arguments");
        out
    }

    /// Evaluates the arguments of a field for one result item.
    ///
    /// `resolve_nested` computes a nested field against the same item; its
    /// failures become errors of the item.
    pub fn extract_field_arguments_for_result_item<F>(
        schema_args: &SchemaArgs,
        mut resolve_nested: F,
    ) -> ItemArgs
    where
        F: FnMut(&str) -> Result<Value, Vec<String>>,
    {
        let mut out = ItemArgs::default();
        for (name, input) in &schema_args.values {
            match input {
                ArgInput::Ready(value) => out.args.set(name.clone(), value.clone()),
                ArgInput::PerItem { arg, ty } => {
                    match resolve_deferred(arg, &mut resolve_nested) {
                        Ok(Value::Null) => {}
                        Ok(value) => match cast_value(&value, ty) {
                            Some(cast) => out.args.set(name.clone(), cast),
                            None => out.warnings.push(format!(
                                "Casting value '{}' for argument '{name}' to type '{ty}' failed, so it has been ignored",
                                display_value(&value)
                            )),
                        },
                        Err(errors) => out.errors.extend(errors),
                    }
                }
            }
        }
        out
    }

    /// Substitutes variables; fails with the name of an undefined one.
    fn resolve_static(&self, value: &ArgValue) -> Result<DeferredArg, String> {
        Ok(match value {
            ArgValue::Null => DeferredArg::Value(Value::Null),
            ArgValue::Literal(text) => DeferredArg::Value(Value::String(text.clone())),
            ArgValue::Variable(name) => DeferredArg::Value(
                self.variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| name.clone())?,
            ),
            ArgValue::Array(elements) => DeferredArg::Array(
                elements
                    .iter()
                    .map(|element| self.resolve_static(element))
                    .collect::<Result<_, _>>()?,
            ),
            ArgValue::NestedField(field) => DeferredArg::Field(field.clone()),
        })
    }
}

fn resolve_deferred<F>(arg: &DeferredArg, resolve_nested: &mut F) -> Result<Value, Vec<String>>
where
    F: FnMut(&str) -> Result<Value, Vec<String>>,
{
    match arg {
        DeferredArg::Value(value) => Ok(value.clone()),
        DeferredArg::Field(field) => resolve_nested(field),
        DeferredArg::Array(elements) => elements
            .iter()
            .map(|element| resolve_deferred(element, resolve_nested))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

fn collect_nested_fields(value: &ArgValue, out: &mut Vec<String>) {
    match value {
        ArgValue::NestedField(field) => out.push(field.clone()),
        ArgValue::Array(elements) => {
            for element in elements {
                collect_nested_fields(element, out);
            }
        }
        _ => {}
    }
}

fn cast_failure(value: &Value, definition: &ArgDefinition) -> String {
    format!(
        "Casting value '{}' for argument '{}' to type '{}' failed, so it has been ignored",
        display_value(value),
        definition.name,
        definition.ty
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;
    use serde_json::json;

    fn interpreter() -> FieldQueryInterpreter {
        let mut variables = IndexMap::new();
        variables.insert("limit".to_string(), json!(5));
        variables.insert("tags".to_string(), json!(["a", "b"]));
        FieldQueryInterpreter::new(Arc::new(QuerySyntax::default()), variables)
    }

    fn int(name: &str) -> ArgDefinition {
        ArgDefinition::new(name, TypeRef::scalar(ScalarType::Int))
    }

    #[test]
    fn test_memoized_parsing() {
        let mut interpreter = interpreter();
        assert_eq!(interpreter.field_name("isPublished()").unwrap(), "ispublished");
        assert!(interpreter.field_name("(x:1)").is_err());
        let args = interpreter.static_field_arguments("posts(limit:3)");
        assert_eq!(args["limit"], "3");
        assert_eq!(interpreter.static_field_arguments("posts(limit:3)"), args);
    }

    #[test]
    fn test_cast_failure_drops_argument() {
        let mut interpreter = interpreter();
        let args = interpreter.extract_field_arguments_for_schema(
            &[int("count"), int("offset")],
            "field(count:\"abc\";offset:2)",
        );
        assert!(args.values.get("count").is_none());
        assert_eq!(args.ready("offset"), Some(&json!(2)));
        assert_eq!(
            args.warnings,
            vec!["Casting value 'abc' for argument 'count' to type 'int' failed, so it has been ignored"]
        );
        assert!(args.errors.is_empty());
    }

    #[test]
    fn test_variables_positional_and_defaults() {
        let mut interpreter = interpreter();
        let definitions = [
            int("limit"),
            ArgDefinition::new("tags", TypeRef::list(TypeRef::scalar(ScalarType::String))),
            ArgDefinition::new("order", TypeRef::scalar(ScalarType::String)).with_default(json!("date")),
            ArgDefinition::new("status", TypeRef::scalar(ScalarType::String)).mandatory(),
        ];
        let args = interpreter
            .extract_field_arguments_for_schema(&definitions, "posts($limit;tags:$tags;unknown:1)");
        assert_eq!(args.ready("limit"), Some(&json!(5)));
        assert_eq!(args.ready("tags"), Some(&json!(["a", "b"])));
        assert_eq!(args.ready("order"), Some(&json!("date")));
        assert_eq!(
            args.errors,
            vec!["Mandatory argument 'status' in field 'posts($limit;tags:$tags;unknown:1)' has not been provided"]
        );
        assert_eq!(args.warnings.len(), 1);
        assert!(args.warnings[0].contains("Argument 'unknown' does not exist"));

        let args = interpreter.extract_field_arguments_for_schema(&[int("limit")], "posts(limit:$missing)");
        assert!(args.values.is_empty());
        assert!(args.warnings[0].contains("Variable '$missing' has not been defined"));
    }

    #[test]
    fn test_nested_fields_are_resolved_per_item() {
        let mut interpreter = interpreter();
        let definitions = [
            ArgDefinition::new("if", TypeRef::scalar(ScalarType::Bool)),
            ArgDefinition::new("ids", TypeRef::list(TypeRef::scalar(ScalarType::Int))),
        ];
        let args = interpreter.extract_field_arguments_for_schema(
            &definitions,
            "skip(if:isDraft();ids:[1;authorId()])",
        );
        assert!(args.is_per_item());
        assert_eq!(args.nested_fields, vec!["isDraft()", "authorId()"]);

        let item = FieldQueryInterpreter::extract_field_arguments_for_result_item(&args, |field| {
            match field {
                "isDraft()" => Ok(json!("true")),
                "authorId()" => Ok(json!("7")),
                _ => Err(vec![format!("unknown field {field}")]),
            }
        });
        assert!(item.errors.is_empty());
        assert_eq!(item.args.get("if"), Some(&json!(true)));
        assert_eq!(item.args.get("ids"), Some(&json!([1, 7])));

        let item = FieldQueryInterpreter::extract_field_arguments_for_result_item(&args, |_| {
            Err(vec!["boom".to_string()])
        });
        assert_eq!(item.errors, vec!["boom", "boom"]);
    }
}
