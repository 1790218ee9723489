//! Request-scoped state.
//!
//! [`RequestContext`] owns every memo table of one request, so nothing is
//! shared between requests. [`ExecutionState`] is the mutable state the
//! directive pipeline threads through its stages.

use crate::directive::{DirectiveInstance, SharedDirective};
use crate::interpreter::{FieldQueryInterpreter, SchemaArgs};
use crate::registry::ExtensionId;
use crate::resolver::SharedFieldResolver;
use fql_core::{Feedback, ItemFeedback};
use fql_syntax::QuerySyntax;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::Arc;

/// The fields requested for one object.
///
/// `conditional` maps a direct field to the fields that only apply when
/// it resolves to a truthy value; those may carry conditions of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFields {
    pub direct: Vec<String>,
    pub conditional: IndexMap<String, DataFields>,
}

impl DataFields {
    /// Creates a set of direct fields.
    pub fn direct<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            direct: fields.into_iter().map(Into::into).collect(),
            conditional: IndexMap::new(),
        }
    }

    /// Adds fields conditional on `condition`.
    #[must_use]
    pub fn with_conditional(mut self, condition: impl Into<String>, fields: DataFields) -> Self {
        self.conditional.insert(condition.into(), fields);
        self
    }

    /// Adds a direct field, ignoring duplicates.
    pub fn push_direct(&mut self, field: &str) {
        if !self.direct.iter().any(|f| f == field) {
            self.direct.push(field.to_string());
        }
    }

    /// Removes a direct field and its conditional fields.
    pub fn remove(&mut self, field: &str) {
        self.direct.retain(|f| f != field);
        self.conditional.shift_remove(field);
    }

    /// Returns true if there is nothing to resolve.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }
}

/// Result-item ID to the fields requested for it.
pub type IdsDataFields = IndexMap<String, DataFields>;

/// Directive token to the work it must run over.
pub type DirectiveQueue = IndexMap<String, IdsDataFields>;

/// Output key to value, for one object.
pub type DbObject = IndexMap<String, Value>;

/// Object ID to resolved values.
pub type DbItems = IndexMap<String, DbObject>;

/// The mutable state threaded through every pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    /// Values resolved for the class being processed.
    pub db_items: DbItems,
    /// Values resolved for earlier levels, by class.
    pub previous_db_items: IndexMap<String, DbItems>,
    /// Variables exported by directives.
    pub variables: IndexMap<String, Value>,
    pub messages: IndexMap<String, Value>,
    /// Feedback keyed by field or directive token.
    pub schema: Feedback,
    /// Feedback keyed by object ID, for the class being processed.
    pub items: ItemFeedback,
}

impl ExecutionState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value for an object.
    pub fn set_db_value(&mut self, id: &str, key: impl Into<String>, value: Value) {
        self.db_items
            .entry(id.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    /// Returns a stored value.
    #[must_use]
    pub fn db_value(&self, id: &str, key: &str) -> Option<&Value> {
        self.db_items.get(id)?.get(key)
    }
}

/// Outcome of validating one field for one class.
///
/// The messages live in `args`, next to the argument errors they include.
#[derive(Debug, Clone, Default)]
pub struct FieldValidation {
    pub valid: bool,
    pub args: Arc<SchemaArgs>,
    /// The class the field points at, if it is relational.
    pub target_class: Option<String>,
}

type ClassKey = (String, String);

/// Request-scoped memo tables.
pub struct RequestContext {
    pub interpreter: FieldQueryInterpreter,
    pub(crate) field_candidates: FxHashMap<ClassKey, Vec<(ExtensionId, SharedFieldResolver)>>,
    pub(crate) directive_candidates: FxHashMap<ClassKey, Vec<(ExtensionId, SharedDirective)>>,
    pub(crate) directive_instances:
        FxHashMap<(String, ExtensionId, String), Option<Arc<DirectiveInstance>>>,
    pub(crate) validated_fields: FxHashMap<ClassKey, FieldValidation>,
    pub(crate) reported_fields: FxHashSet<ClassKey>,
    pub(crate) values: FxHashMap<(String, String, String), Result<Value, Vec<String>>>,
}

impl RequestContext {
    /// Creates the context of one request.
    pub fn new(syntax: Arc<QuerySyntax>, variables: IndexMap<String, Value>) -> Self {
        Self {
            interpreter: FieldQueryInterpreter::new(syntax, variables),
            field_candidates: FxHashMap::default(),
            directive_candidates: FxHashMap::default(),
            directive_instances: FxHashMap::default(),
            validated_fields: FxHashMap::default(),
            reported_fields: FxHashSet::default(),
            values: FxHashMap::default(),
        }
    }

    /// Returns the grammar.
    #[must_use]
    pub fn syntax(&self) -> &QuerySyntax {
        self.interpreter.syntax()
    }

    /// Number of memoized field values.
    #[must_use]
    pub fn memoized_value_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_fields() {
        let mut fields = DataFields::direct(["id", "isPublished"])
            .with_conditional("isPublished", DataFields::direct(["title"]));
        fields.push_direct("id");
        assert_eq!(fields.direct, vec!["id", "isPublished"]);

        fields.remove("isPublished");
        assert_eq!(fields.direct, vec!["id"]);
        assert!(fields.conditional.is_empty());
    }

    #[test]
    fn test_db_values() {
        let mut state = ExecutionState::new();
        state.set_db_value("1", "title", json!("Hello"));
        assert_eq!(state.db_value("1", "title"), Some(&json!("Hello")));
        assert_eq!(state.db_value("2", "title"), None);
    }
}
