//! The directive API.
//!
//! A directive resolver is attached to a class with a priority, like a
//! field resolver. Each distinct directive token found in a query becomes a
//! [`DirectiveInstance`], validated once and then executed as one stage of
//! the directive pipeline over every field it applies to.

use crate::context::{DataFields, DirectiveQueue, ExecutionState, IdsDataFields, RequestContext};
use crate::field_resolver::FieldResolver;
use crate::interpreter::{FieldQueryInterpreter, ItemArgs, SchemaArgs};
use crate::pipeline::SucceedingStages;
use crate::registry::ExtensionId;
use crate::schema::ArgDefinition;
use fql_core::Severity;
use fql_syntax::QuerySyntax;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The zone a directive runs in. Zones run in declaration order, whatever
/// the order of the directives in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePosition {
    /// Before values are resolved: validation, access, skipping.
    Front,
    /// Value resolution.
    Middle,
    /// After values are resolved: output shaping.
    Back,
}

/// A directive implementation.
pub trait DirectiveResolver: Send + Sync {
    /// The directive name, matched case-insensitively.
    fn name(&self) -> &str;

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Middle
    }

    /// Whether the directive may appear more than once in one field's
    /// directive chain.
    fn is_repeatable(&self) -> bool {
        true
    }

    fn args(&self) -> Vec<ArgDefinition> {
        Vec::new()
    }

    fn description(&self) -> Option<String> {
        None
    }

    fn deprecation(&self) -> Option<String> {
        None
    }

    /// Lets a resolver decline a field, so a lower-priority candidate with
    /// the same name handles it. Arguments are raw, never interpreted.
    fn can_process(&self, _field_name: &str, _args: &IndexMap<String, String>) -> bool {
        true
    }

    /// Extra schema validation, run once per instance. Returns errors.
    fn validate(&self, _args: &SchemaArgs, _fields: &[String]) -> Vec<String> {
        Vec::new()
    }

    /// Runs the directive over its fields.
    fn execute(
        &self,
        instance: &DirectiveInstance,
        fields: &IdsDataFields,
        succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    );
}

/// A shared directive resolver.
pub type SharedDirective = Arc<dyn DirectiveResolver>;

/// One validated directive occurrence.
pub struct DirectiveInstance {
    /// The attachment that resolved the directive.
    pub id: ExtensionId,
    pub resolver: SharedDirective,
    /// The queue token, repetition tag included.
    pub token: String,
    /// The directive as written.
    pub directive: String,
    /// The lower-cased directive name.
    pub name: String,
    pub args: Arc<SchemaArgs>,
}

impl DirectiveInstance {
    #[must_use]
    pub fn position(&self) -> PipelinePosition {
        self.resolver.position()
    }
}

impl fmt::Debug for DirectiveInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveInstance")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}

/// What a stage sees while it executes.
pub struct StageContext<'a, 'e> {
    pub(crate) resolver: &'a FieldResolver<'e>,
    pub(crate) ctx: &'a mut RequestContext,
    pub state: &'a mut ExecutionState,
    pub(crate) queue: &'a mut DirectiveQueue,
}

impl<'a, 'e> StageContext<'a, 'e> {
    /// The class whose objects are being resolved.
    #[must_use]
    pub fn class(&self) -> &'a str {
        self.resolver.class()
    }

    #[must_use]
    pub fn syntax(&self) -> &'a QuerySyntax {
        self.resolver.syntax()
    }

    /// Returns a loaded object.
    #[must_use]
    pub fn object(&self, id: &str) -> Option<&'a Value> {
        self.resolver.object(id)
    }

    /// The key a field's value is stored under.
    #[must_use]
    pub fn output_key(&self, field: &str) -> String {
        self.syntax().field_output_key(field)
    }

    /// Validates a field against the schema of the class, reporting its
    /// feedback the first time.
    pub fn validate_field(&mut self, field: &str) -> bool {
        self.resolver
            .validate_field(self.ctx, self.state, field)
            .valid
    }

    /// Resolves a field for one object. Memoized per request.
    pub fn resolve_value(&mut self, id: &str, field: &str) -> Result<Value, Vec<String>> {
        self.resolver.resolve_value(self.ctx, self.state, id, field)
    }

    /// Evaluates the arguments of a directive for one object.
    pub fn directive_args(&mut self, instance: &DirectiveInstance, id: &str) -> ItemArgs {
        let resolver = self.resolver;
        let ctx = &mut *self.ctx;
        let state = &mut *self.state;
        FieldQueryInterpreter::extract_field_arguments_for_result_item(&instance.args, |nested| {
            resolver.resolve_value(ctx, state, id, nested)
        })
    }

    /// Returns the value stored for a field of an object.
    #[must_use]
    pub fn db_value(&self, id: &str, field: &str) -> Option<&Value> {
        self.state.db_value(id, &self.output_key(field))
    }

    /// Stores the value of a field of an object.
    pub fn set_db_value(&mut self, id: &str, field: &str, value: Value) {
        let key = self.output_key(field);
        self.state.set_db_value(id, key, value);
    }

    pub fn item_error(&mut self, id: &str, field: &str, message: impl Into<String>) {
        self.state.items.push(Severity::Error, id, field, message);
    }

    pub fn item_warning(&mut self, id: &str, field: &str, message: impl Into<String>) {
        self.state.items.push(Severity::Warning, id, field, message);
    }

    /// Records a schema error under a field or directive token.
    pub fn schema_error(&mut self, key: &str, message: impl Into<String>) {
        self.state.schema.push(Severity::Error, key, message);
    }

    pub fn schema_warning(&mut self, key: &str, message: impl Into<String>) {
        self.state.schema.push(Severity::Warning, key, message);
    }

    /// Schedules a field for the next drain iteration. Only the directives
    /// written on `field` run; the mandatory ones do not.
    pub fn enqueue_field(&mut self, id: &str, field: &str) {
        let syntax = self.syntax();
        let (directives, errors) = self.ctx.interpreter.field_directives(field);
        for error in errors {
            self.state.schema.push(Severity::Error, field, error.message);
        }
        for token in syntax.tag_repeated_directives(&directives) {
            self.queue
                .entry(token)
                .or_default()
                .entry(id.to_string())
                .or_insert_with(DataFields::default)
                .push_direct(field);
        }
    }
}
