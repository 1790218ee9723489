//! Field resolution for the objects of one class.
//!
//! A [`FieldResolver`] holds the objects loaded for one level of a query
//! and runs the directive pipeline over them:
//!
//! 1. Every field gets its directive chain, the mandatory directives
//!    followed by the ones written in the query, with repeated directives
//!    tagged so each occurrence has its own token.
//! 2. The queue of tokens is drained in iterations. Each iteration takes
//!    the whole queue, resolves and validates one instance per token and
//!    attachment, orders the instances by zone and runs them. Stages may
//!    enqueue more work, which the next iteration picks up.
//!
//! Schema problems are recorded in the execution state, keyed by field or
//! directive token. Nothing here fails the request.

use crate::context::{
    DataFields, DirectiveQueue, ExecutionState, FieldValidation, IdsDataFields, RequestContext,
};
use crate::directive::{DirectiveInstance, SharedDirective, StageContext};
use crate::engine::{ClassKind, Engine};
use crate::interpreter::{FieldQueryInterpreter, SchemaArgs};
use crate::pipeline::{DirectivePipeline, Stage};
use crate::registry::ExtensionId;
use crate::resolver::SharedFieldResolver;
use fql_core::{FqlError, FqlResult, Severity};
use fql_syntax::QuerySyntax;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Resolves fields for the objects of one class.
pub struct FieldResolver<'e> {
    engine: &'e Engine,
    class: String,
    objects: IndexMap<String, Value>,
    /// Concrete class of each object, for unions.
    item_classes: FxHashMap<String, String>,
}

impl<'e> FieldResolver<'e> {
    /// Loads the objects with the given IDs.
    ///
    /// Objects of a union are loaded through the loaders of its member
    /// classes, in picker order, and each is assigned to the first picker
    /// that accepts it.
    pub(crate) fn load(engine: &'e Engine, class: &str, ids: &[String]) -> FqlResult<Self> {
        let mut resolver = Self {
            engine,
            class: class.to_string(),
            objects: IndexMap::new(),
            item_classes: FxHashMap::default(),
        };
        match engine.kinds.get(class) {
            Some(ClassKind::Object(loader)) => resolver.objects = loader.load(ids),
            Some(ClassKind::Union) => resolver.load_union(ids)?,
            None if engine.classes.contains(class) => {
                return Err(FqlError::MissingLoader(class.to_string()));
            }
            None => return Err(FqlError::UnknownResolver(class.to_string())),
        }
        debug!(
            class,
            requested = ids.len(),
            loaded = resolver.objects.len(),
            "loaded objects"
        );
        Ok(resolver)
    }

    fn load_union(&mut self, ids: &[String]) -> FqlResult<()> {
        let pickers = self.engine.pickers.attached(&self.class);
        let mut remaining = ids.to_vec();
        for (_, picker) in &pickers {
            if remaining.is_empty() {
                break;
            }
            let target = picker.target_class();
            let Some(ClassKind::Object(loader)) = self.engine.kinds.get(target) else {
                return Err(FqlError::MissingLoader(target.to_string()));
            };
            for (id, item) in loader.load(&remaining) {
                if let Some((_, owner)) = pickers.iter().find(|(_, p)| p.is_instance_of(&item)) {
                    self.item_classes
                        .insert(id.clone(), owner.target_class().to_string());
                    self.objects.insert(id, item);
                }
            }
            remaining.retain(|id| !self.objects.contains_key(id));
        }
        Ok(())
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn syntax(&self) -> &QuerySyntax {
        &self.engine.syntax
    }

    #[must_use]
    pub fn object(&self, id: &str) -> Option<&Value> {
        self.objects.get(id)
    }

    #[must_use]
    pub fn objects(&self) -> &IndexMap<String, Value> {
        &self.objects
    }

    fn item_class(&self, id: &str) -> &str {
        self.item_classes
            .get(id)
            .map_or(self.class.as_str(), String::as_str)
    }

    fn is_union(&self) -> bool {
        matches!(self.engine.kinds.get(&self.class), Some(ClassKind::Union))
    }

    /// The classes whose schema applies: the class itself, or the members
    /// of a union.
    fn schema_classes(&self) -> Vec<String> {
        if !self.is_union() {
            return vec![self.class.clone()];
        }
        let mut classes: Vec<String> = Vec::new();
        for (_, picker) in self.engine.pickers.attached(&self.class) {
            if !classes.iter().any(|c| c == picker.target_class()) {
                classes.push(picker.target_class().to_string());
            }
        }
        classes
    }

    // ========================================================================
    // Fields
    // ========================================================================

    /// Field resolvers answering for `name`, most specific first. Memoized.
    pub(crate) fn field_candidates(
        &self,
        ctx: &mut RequestContext,
        class: &str,
        name: &str,
    ) -> Vec<(ExtensionId, SharedFieldResolver)> {
        let key = (class.to_string(), name.to_string());
        if let Some(candidates) = ctx.field_candidates.get(&key) {
            return candidates.clone();
        }
        let chain = self.engine.classes.chain(class);
        let candidates: Vec<_> = self
            .engine
            .field_resolvers
            .candidates(&chain)
            .into_iter()
            .filter(|(_, resolver)| resolver.resolves_field(name))
            .collect();
        trace!(class, name, candidates = candidates.len(), "field candidates");
        ctx.field_candidates.insert(key, candidates.clone());
        candidates
    }

    fn validation_in(&self, ctx: &mut RequestContext, class: &str, field: &str) -> FieldValidation {
        let key = (class.to_string(), field.to_string());
        if let Some(validation) = ctx.validated_fields.get(&key) {
            return validation.clone();
        }
        let validation = self.compute_validation(ctx, class, field);
        ctx.validated_fields.insert(key, validation.clone());
        validation
    }

    fn compute_validation(&self, ctx: &mut RequestContext, class: &str, field: &str) -> FieldValidation {
        let name = match ctx.interpreter.field_name(field) {
            Ok(name) => name,
            Err(error) => return invalid(error.message),
        };
        let Some((_, resolver)) = self.field_candidates(ctx, class, &name).into_iter().next() else {
            return invalid(format!("There is no field '{name}' in class '{class}'"));
        };

        let mut args = ctx
            .interpreter
            .extract_field_arguments_for_schema(&resolver.field_args(&name), field);
        for nested in args.nested_fields.clone() {
            let validation = self.validation_in(ctx, class, &nested);
            if !validation.valid {
                args.errors.extend(
                    validation
                        .args
                        .errors
                        .iter()
                        .map(|error| format!("Argument field '{nested}' is not valid: {error}")),
                );
            }
        }
        if let Some(reason) = resolver.field_deprecation(&name) {
            args.deprecations
                .push(format!("Field '{name}' is deprecated: {reason}"));
        }

        FieldValidation {
            valid: args.errors.is_empty(),
            target_class: resolver
                .field_type(&name)
                .and_then(|ty| ty.target_class().map(str::to_string)),
            args: Arc::new(args),
        }
    }

    /// Validates a field against the schema, without reporting.
    ///
    /// For a union the field is valid if any member resolves it.
    pub(crate) fn schema_validation(&self, ctx: &mut RequestContext, field: &str) -> FieldValidation {
        let mut chosen: Option<FieldValidation> = None;
        for class in self.schema_classes() {
            let validation = self.validation_in(ctx, &class, field);
            let valid = validation.valid;
            if valid || chosen.is_none() {
                chosen = Some(validation);
            }
            if valid {
                break;
            }
        }
        chosen.unwrap_or_else(|| invalid(format!("Union '{}' has no member classes", self.class)))
    }

    /// Validates a field, recording its feedback the first time the field
    /// is seen for this class.
    pub fn validate_field(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        field: &str,
    ) -> FieldValidation {
        let validation = self.schema_validation(ctx, field);
        if ctx
            .reported_fields
            .insert((self.class.clone(), field.to_string()))
        {
            let args = &validation.args;
            for (severity, messages) in [
                (Severity::Error, &args.errors),
                (Severity::Warning, &args.warnings),
                (Severity::Deprecation, &args.deprecations),
            ] {
                for message in messages {
                    state.schema.push(severity, field, message.clone());
                }
            }
        }
        validation
    }

    /// The class a relational field points at.
    pub fn relational_target(&self, ctx: &mut RequestContext, field: &str) -> Option<String> {
        self.schema_validation(ctx, field).target_class
    }

    /// Resolves a field for one object.
    ///
    /// Results are memoized per concrete class, object and `name(args)`,
    /// so aliases and directives never cause a second call into the
    /// resolver.
    pub fn resolve_value(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        id: &str,
        field: &str,
    ) -> Result<Value, Vec<String>> {
        let Some(item) = self.objects.get(id) else {
            return Err(vec![format!("Object with ID '{id}' has not been loaded")]);
        };
        let class = self.item_class(id);
        let key = (
            class.to_string(),
            id.to_string(),
            self.syntax().field_signature(field).to_string(),
        );
        if let Some(result) = ctx.values.get(&key) {
            return result.clone();
        }
        let result = self.compute_value(ctx, state, class, id, item, field);
        ctx.values.insert(key, result.clone());
        result
    }

    fn compute_value(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        class: &str,
        id: &str,
        item: &Value,
        field: &str,
    ) -> Result<Value, Vec<String>> {
        if self.is_union() {
            // Fields of other members are null for this item.
            if let Ok(name) = ctx.interpreter.field_name(field) {
                if self.field_candidates(ctx, class, &name).is_empty() {
                    return Ok(Value::Null);
                }
            }
        }
        let validation = self.validation_in(ctx, class, field);
        if !validation.valid {
            return Err(validation.args.errors.clone());
        }
        let name = ctx
            .interpreter
            .field_name(field)
            .map_err(|error| vec![error.message])?;

        let item_args = FieldQueryInterpreter::extract_field_arguments_for_result_item(
            &validation.args,
            |nested| self.resolve_value(ctx, state, id, nested),
        );
        for warning in item_args.warnings {
            state.items.push(Severity::Warning, id, field, warning);
        }
        if !item_args.errors.is_empty() {
            return Err(item_args.errors);
        }

        let candidates = self.field_candidates(ctx, class, &name);
        let Some((extension, resolver)) = candidates
            .iter()
            .find(|(_, resolver)| resolver.can_process_result_item(item, &name, &item_args.args))
        else {
            return Err(vec![format!(
                "No resolver in class '{class}' can process field '{name}' for object with ID '{id}'"
            )]);
        };
        trace!(class, id, field, resolver = %extension, "resolving value");
        resolver
            .resolve_value(item, &name, &item_args.args)
            .map_err(|error| vec![error.to_string()])
    }

    // ========================================================================
    // Directive pipeline
    // ========================================================================

    /// Runs the fields of every object through the directive pipeline.
    pub fn resolve_fields(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        ids_fields: &IdsDataFields,
    ) {
        let queue = self.enqueue(ctx, state, ids_fields);
        self.drain(ctx, state, queue);
    }

    fn enqueue(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        ids_fields: &IdsDataFields,
    ) -> DirectiveQueue {
        let syntax = self.syntax();
        let mandatory = &self.engine.config.mandatory_directives;
        let mut chains: FxHashMap<&str, Vec<String>> = FxHashMap::default();
        let mut queue = DirectiveQueue::new();

        for (id, data_fields) in ids_fields {
            for field in &data_fields.direct {
                let tokens = chains.entry(field.as_str()).or_insert_with(|| {
                    let (explicit, errors) = ctx.interpreter.field_directives(field);
                    for error in errors {
                        state
                            .schema
                            .push(Severity::Error, field.as_str(), error.message);
                    }
                    let chain: Vec<String> = mandatory.iter().cloned().chain(explicit).collect();
                    syntax.tag_repeated_directives(&chain)
                });
                for token in tokens.iter() {
                    let entry = queue
                        .entry(token.clone())
                        .or_default()
                        .entry(id.clone())
                        .or_default();
                    add_field(entry, data_fields, field);
                }
            }
        }
        queue
    }

    fn drain(&self, ctx: &mut RequestContext, state: &mut ExecutionState, mut queue: DirectiveQueue) {
        let limit = self.engine.config.max_drain_iterations;
        let mut iteration = 0;
        while !queue.is_empty() {
            if iteration == limit {
                warn!(class = %self.class, limit, "directive pipeline did not settle");
                for token in queue.keys() {
                    state.schema.push(
                        Severity::Error,
                        token.as_str(),
                        format!(
                            "Directive '{token}' has not been executed, as the pipeline reached its limit of {limit} iterations"
                        ),
                    );
                }
                break;
            }
            iteration += 1;

            let snapshot = std::mem::take(&mut queue);
            let pipeline = DirectivePipeline::new(self.build_stages(ctx, state, snapshot));
            debug!(
                class = %self.class,
                iteration,
                stages = ?pipeline.tokens().collect::<Vec<_>>(),
                "executing directive pipeline"
            );
            let mut cx = StageContext {
                resolver: self,
                ctx: &mut *ctx,
                state: &mut *state,
                queue: &mut queue,
            };
            pipeline.execute(&mut cx);
        }
    }

    fn build_stages(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        snapshot: DirectiveQueue,
    ) -> Vec<Stage> {
        let stop_on_failure = self.engine.config.stop_pipeline_on_directive_failure;
        let mut stages = Vec::new();
        for (token, ids_fields) in snapshot {
            let succeeded = self.stages_for_token(ctx, state, &token, ids_fields, &mut stages);
            if !succeeded && stop_on_failure {
                debug!(class = %self.class, token, "directive failed, skipping the remaining directives");
                break;
            }
        }
        stages
    }

    /// Adds the stages of one token. Returns false if any part of it
    /// failed.
    fn stages_for_token(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        token: &str,
        ids_fields: IdsDataFields,
        stages: &mut Vec<Stage>,
    ) -> bool {
        let (directive, _) = self.syntax().strip_repetition_tag(token);
        let name = match ctx.interpreter.field_name(directive) {
            Ok(name) => name,
            Err(error) => {
                state.schema.push(Severity::Error, token, error.message);
                return false;
            }
        };
        let candidates = self.directive_candidates(ctx, &name);
        if candidates.is_empty() {
            state.schema.push(
                Severity::Error,
                token,
                format!("No resolver found for directive '{name}'"),
            );
            return false;
        }

        let static_args = ctx.interpreter.static_field_arguments(directive);
        let mut groups: IndexMap<ExtensionId, (SharedDirective, IdsDataFields)> = IndexMap::new();
        let mut unprocessed: Vec<String> = Vec::new();
        for (id, data_fields) in &ids_fields {
            for field in &data_fields.direct {
                let field_name = ctx.interpreter.field_name(field).unwrap_or_default();
                let Some((extension, resolver)) = candidates
                    .iter()
                    .find(|(_, resolver)| resolver.can_process(&field_name, &static_args))
                else {
                    if !unprocessed.contains(field) {
                        unprocessed.push(field.clone());
                    }
                    continue;
                };
                let entry = groups
                    .entry(*extension)
                    .or_insert_with(|| (Arc::clone(resolver), IdsDataFields::new()))
                    .1
                    .entry(id.clone())
                    .or_default();
                add_field(entry, data_fields, field);
            }
        }

        let mut succeeded = true;
        if !unprocessed.is_empty() {
            state.schema.push(
                Severity::Error,
                token,
                format!(
                    "No resolver for directive '{name}' can process field(s) {}",
                    quote_list(&unprocessed)
                ),
            );
            succeeded = false;
        }
        for (extension, (resolver, fields)) in groups {
            let mut affected: Vec<String> = Vec::new();
            for field in fields.values().flat_map(|data_fields| &data_fields.direct) {
                if !affected.contains(field) {
                    affected.push(field.clone());
                }
            }
            match self.directive_instance(ctx, state, extension, resolver, token, &affected) {
                Some(instance) => stages.push(Stage::new(instance, fields)),
                None => succeeded = false,
            }
        }
        succeeded
    }

    /// Directive resolvers named `name`, most specific first. Memoized.
    fn directive_candidates(
        &self,
        ctx: &mut RequestContext,
        name: &str,
    ) -> Vec<(ExtensionId, SharedDirective)> {
        let key = (self.class.clone(), name.to_string());
        if let Some(candidates) = ctx.directive_candidates.get(&key) {
            return candidates.clone();
        }
        let chain = self.engine.classes.chain(&self.class);
        let candidates: Vec<_> = self
            .engine
            .directives
            .candidates(&chain)
            .into_iter()
            .filter(|(_, resolver)| resolver.name().eq_ignore_ascii_case(name))
            .collect();
        ctx.directive_candidates.insert(key, candidates.clone());
        candidates
    }

    /// Returns the validated instance for a token, validating it on first
    /// use. `None` if validation failed.
    fn directive_instance(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        extension: ExtensionId,
        resolver: SharedDirective,
        token: &str,
        fields: &[String],
    ) -> Option<Arc<DirectiveInstance>> {
        let key = (self.class.clone(), extension, token.to_string());
        if let Some(instance) = ctx.directive_instances.get(&key) {
            return instance.clone();
        }

        let (directive, counter) = self.syntax().strip_repetition_tag(token);
        let name = resolver.name().to_string();
        let mut args: SchemaArgs = ctx
            .interpreter
            .extract_field_arguments_for_schema(&resolver.args(), directive);
        let mut errors = std::mem::take(&mut args.errors);
        if counter.is_some() && !resolver.is_repeatable() {
            errors.push(format!(
                "Directive '{name}' can be executed only once for each field"
            ));
        }
        for nested in args.nested_fields.clone() {
            if !self.validate_field(ctx, state, &nested).valid {
                errors.push(format!(
                    "Argument field '{nested}' of directive '{name}' is not valid"
                ));
            }
        }
        if errors.is_empty() {
            errors.extend(resolver.validate(&args, fields));
        }
        let mut deprecations = std::mem::take(&mut args.deprecations);
        if let Some(reason) = resolver.deprecation() {
            deprecations.push(format!("Directive '{name}' is deprecated: {reason}"));
        }

        let affected = quote_list(fields);
        for (severity, messages) in [
            (Severity::Error, &errors),
            (Severity::Warning, &args.warnings),
            (Severity::Deprecation, &deprecations),
        ] {
            for message in messages {
                state.schema.push(
                    severity,
                    token,
                    format!("{message} (affected field(s): {affected})"),
                );
            }
        }

        let instance = if errors.is_empty() {
            Some(Arc::new(DirectiveInstance {
                id: extension,
                resolver,
                token: token.to_string(),
                directive: directive.to_string(),
                name: name.to_ascii_lowercase(),
                args: Arc::new(args),
            }))
        } else {
            debug!(class = %self.class, token, errors = errors.len(), "directive failed validation");
            None
        };
        ctx.directive_instances.insert(key, instance.clone());
        instance
    }
}

/// Adds `field` to `entry`, along with its conditional fields.
fn add_field(entry: &mut DataFields, source: &DataFields, field: &str) {
    entry.push_direct(field);
    if let Some(conditional) = source.conditional.get(field) {
        entry
            .conditional
            .insert(field.to_string(), conditional.clone());
    }
}

fn invalid(message: String) -> FieldValidation {
    FieldValidation {
        valid: false,
        args: Arc::new(SchemaArgs {
            errors: vec![message],
            ..SchemaArgs::default()
        }),
        target_class: None,
    }
}

/// `'a', 'b'`
pub(crate) fn quote_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("'{item}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
