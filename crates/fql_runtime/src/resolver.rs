//! Field value resolvers.
//!
//! A field value resolver is attached to a class and answers for a set of
//! field names: it declares their schema and computes their values for a
//! result item.

use crate::schema::{ArgDefinition, FieldDefinition, TypeRef};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Arguments passed to a resolver, already cast to their declared types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldArgs {
    args: IndexMap<String, Value>,
}

impl FieldArgs {
    /// Creates empty arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an argument by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolveError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolveError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ResolveError::ArgumentParse(name.to_string(), e.to_string()))
            })
    }

    /// Returns true if the argument is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// Iterates over the arguments in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.args.iter()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }

    /// Returns the arguments as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.args
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for FieldArgs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().collect(),
        }
    }
}

/// Error from a resolver. Reported per result item, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("field '{0}' cannot be resolved for this object")]
    FieldNotFound(String),
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    #[error("failed to parse argument '{0}': {1}")]
    ArgumentParse(String, String),
    #[error("{0}")]
    Custom(String),
}

/// Result type for resolvers.
pub type ResolveResult = Result<Value, ResolveError>;

/// Resolves the values of a set of fields.
pub trait FieldValueResolver: Send + Sync {
    /// Names of the fields this resolver answers for.
    fn field_names(&self) -> Vec<String>;

    /// Returns true if this resolver answers for `field_name`, ignoring case.
    fn resolves_field(&self, field_name: &str) -> bool {
        self.field_names()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(field_name))
    }

    fn field_type(&self, field_name: &str) -> Option<TypeRef>;

    fn field_args(&self, _field_name: &str) -> Vec<ArgDefinition> {
        Vec::new()
    }

    fn field_description(&self, _field_name: &str) -> Option<String> {
        None
    }

    /// A deprecation message, reported whenever the field is queried.
    fn field_deprecation(&self, _field_name: &str) -> Option<String> {
        None
    }

    /// Lets a resolver decline an item so the next candidate gets it.
    fn can_process_result_item(&self, _item: &Value, _field_name: &str, _args: &FieldArgs) -> bool {
        true
    }

    /// Computes the value of `field_name` for `item`. Relational fields
    /// return the ID, or list of IDs, of the target objects.
    fn resolve_value(&self, item: &Value, field_name: &str, args: &FieldArgs) -> ResolveResult;
}

/// A boxed resolver.
pub type SharedFieldResolver = Arc<dyn FieldValueResolver>;

/// A sync resolver function.
pub type ResolveFn = Arc<dyn Fn(&Value, &FieldArgs) -> ResolveResult + Send + Sync>;

/// A resolver built from closures, one per field.
#[derive(Default)]
pub struct FnFieldResolver {
    fields: IndexMap<String, (FieldDefinition, ResolveFn)>,
}

impl FnFieldResolver {
    /// Creates a resolver without fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn field<F>(mut self, definition: FieldDefinition, f: F) -> Self
    where
        F: Fn(&Value, &FieldArgs) -> ResolveResult + Send + Sync + 'static,
    {
        self.fields.insert(
            definition.name.to_ascii_lowercase(),
            (definition, Arc::new(f)),
        );
        self
    }

    fn definition(&self, field_name: &str) -> Option<&(FieldDefinition, ResolveFn)> {
        self.fields.get(&field_name.to_ascii_lowercase())
    }
}

impl Debug for FnFieldResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFieldResolver")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldValueResolver for FnFieldResolver {
    fn field_names(&self) -> Vec<String> {
        self.fields.values().map(|(d, _)| d.name.clone()).collect()
    }

    fn resolves_field(&self, field_name: &str) -> bool {
        self.definition(field_name).is_some()
    }

    fn field_type(&self, field_name: &str) -> Option<TypeRef> {
        self.definition(field_name).map(|(d, _)| d.ty.clone())
    }

    fn field_args(&self, field_name: &str) -> Vec<ArgDefinition> {
        self.definition(field_name)
            .map(|(d, _)| d.args.clone())
            .unwrap_or_default()
    }

    fn field_description(&self, field_name: &str) -> Option<String> {
        self.definition(field_name)
            .and_then(|(d, _)| d.description.clone())
    }

    fn field_deprecation(&self, field_name: &str) -> Option<String> {
        self.definition(field_name)
            .and_then(|(d, _)| d.deprecation.clone())
    }

    fn resolve_value(&self, item: &Value, field_name: &str, args: &FieldArgs) -> ResolveResult {
        match self.definition(field_name) {
            Some((_, func)) => func(item, args),
            None => Err(ResolveError::FieldNotFound(field_name.to_string())),
        }
    }
}

/// Resolver that reads fields straight from the item's properties.
#[derive(Debug, Clone, Default)]
pub struct PropertyResolver {
    fields: IndexMap<String, FieldDefinition>,
}

impl PropertyResolver {
    /// Creates a resolver without fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes the property named like the field.
    #[must_use]
    pub fn property(mut self, definition: FieldDefinition) -> Self {
        self.fields
            .insert(definition.name.to_ascii_lowercase(), definition);
        self
    }

    fn definition(&self, field_name: &str) -> Option<&FieldDefinition> {
        self.fields.get(&field_name.to_ascii_lowercase())
    }
}

impl FieldValueResolver for PropertyResolver {
    fn field_names(&self) -> Vec<String> {
        self.fields.values().map(|d| d.name.clone()).collect()
    }

    fn resolves_field(&self, field_name: &str) -> bool {
        self.definition(field_name).is_some()
    }

    fn field_type(&self, field_name: &str) -> Option<TypeRef> {
        self.definition(field_name).map(|d| d.ty.clone())
    }

    fn field_description(&self, field_name: &str) -> Option<String> {
        self.definition(field_name).and_then(|d| d.description.clone())
    }

    fn field_deprecation(&self, field_name: &str) -> Option<String> {
        self.definition(field_name).and_then(|d| d.deprecation.clone())
    }

    fn resolve_value(&self, item: &Value, field_name: &str, _args: &FieldArgs) -> ResolveResult {
        let Some(definition) = self.definition(field_name) else {
            return Err(ResolveError::FieldNotFound(field_name.to_string()));
        };
        match item {
            Value::Object(map) => {
                let value = map.get(&definition.name).or_else(|| {
                    map.iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(&definition.name))
                        .map(|(_, value)| value)
                });
                Ok(value.cloned().unwrap_or(Value::Null))
            }
            Value::Null => Ok(Value::Null),
            _ => Err(ResolveError::FieldNotFound(field_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;
    use serde_json::json;

    #[test]
    fn test_field_args() {
        let mut args = FieldArgs::new();
        args.set("id", json!(123));
        args.set("name", json!("test"));

        assert_eq!(args.get_as::<i64>("id"), Some(123));
        assert_eq!(args.get_as::<String>("name"), Some("test".to_string()));
        assert_eq!(args.get_as::<i64>("missing"), None);
        assert_eq!(
            args.require::<i64>("missing"),
            Err(ResolveError::MissingArgument("missing".to_string()))
        );
        assert_eq!(args.to_json(), json!({"id": 123, "name": "test"}));
    }

    #[test]
    fn test_fn_resolver() {
        let resolver = FnFieldResolver::new().field(
            FieldDefinition::new("wordCount", TypeRef::scalar(ScalarType::Int)),
            |item, _args| {
                let content = item["content"].as_str().unwrap_or_default();
                Ok(json!(content.split_whitespace().count()))
            },
        );

        assert!(resolver.resolves_field("wordcount"));
        assert_eq!(resolver.field_names(), vec!["wordCount"]);
        let item = json!({"content": "hello brave new world"});
        assert_eq!(
            resolver.resolve_value(&item, "wordcount", &FieldArgs::new()),
            Ok(json!(4))
        );
        assert!(resolver
            .resolve_value(&item, "title", &FieldArgs::new())
            .is_err());
    }

    #[test]
    fn test_property_resolver() {
        let resolver = PropertyResolver::new()
            .property(FieldDefinition::new("title", TypeRef::scalar(ScalarType::String)))
            .property(FieldDefinition::new("isPublished", TypeRef::scalar(ScalarType::Bool)));

        let item = json!({"title": "Hello", "isPublished": true});
        let args = FieldArgs::new();
        assert_eq!(resolver.resolve_value(&item, "title", &args), Ok(json!("Hello")));
        assert_eq!(resolver.resolve_value(&item, "ispublished", &args), Ok(json!(true)));
        assert_eq!(
            resolver.resolve_value(&json!({}), "title", &args),
            Ok(Value::Null)
        );
        assert!(resolver.resolve_value(&json!(3), "title", &args).is_err());
    }
}
