//! The engine: registration, and query execution level by level.
//!
//! A query is converted to a field tree and resolved one level at a time.
//! Each level loads the objects of one class, runs their fields through the
//! directive pipeline, then schedules the sub-tree of every relational
//! field for the target class. Levels wait in an explicit queue, so deep
//! queries never deepen the call stack.

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::context::{DataFields, DbItems, DbObject, ExecutionState, IdsDataFields, RequestContext};
use crate::definition::SchemaDefinition;
use crate::directive::{DirectiveResolver, SharedDirective};
use crate::directives::builtin_directives;
use crate::field_resolver::FieldResolver;
use crate::loader::{normalize_id, MemoryLoader, TypeDataLoader};
use crate::registry::{ClassDeclaration, ClassHierarchy, ExtensionRegistry, GLOBAL_CLASS};
use crate::resolver::FieldValueResolver;
use crate::union::TypeResolverPicker;
use fql_core::{Feedback, FqlError, FqlResult, ItemFeedback, Severity};
use fql_syntax::{QueryConverter, QueryError, QuerySyntax, QueryTree};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// ID of the single root object.
pub const ROOT_ID: &str = "root";

/// How the objects of a class are obtained.
#[derive(Clone)]
pub enum ClassKind {
    Object(Arc<dyn TypeDataLoader>),
    /// Objects come from the member classes, through pickers.
    Union,
}

impl fmt::Debug for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) => f.write_str("Object"),
            Self::Union => f.write_str("Union"),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds an [`Engine`].
///
/// The built-in directives are attached to the global class first, so a
/// directive registered later under the same name takes precedence.
pub struct EngineBuilder {
    config: EngineConfig,
    classes: ClassHierarchy,
    kinds: IndexMap<String, ClassKind>,
    field_resolvers: ExtensionRegistry<dyn FieldValueResolver>,
    directives: ExtensionRegistry<dyn DirectiveResolver>,
    pickers: ExtensionRegistry<dyn TypeResolverPicker>,
    root: Option<String>,
    cache: Option<Arc<dyn CacheStore>>,
    errors: Vec<FqlError>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with the built-in directives attached.
    #[must_use]
    pub fn new() -> Self {
        let mut directives = ExtensionRegistry::new();
        for directive in builtin_directives() {
            directives.attach(GLOBAL_CLASS, directive, 0);
        }
        Self {
            config: EngineConfig::default(),
            classes: ClassHierarchy::new(),
            kinds: IndexMap::new(),
            field_resolvers: ExtensionRegistry::new(),
            directives,
            pickers: ExtensionRegistry::new(),
            root: None,
            cache: None,
            errors: Vec::new(),
        }
    }

    /// Declares a class.
    #[must_use]
    pub fn with_class(mut self, declaration: ClassDeclaration) -> Self {
        if let Err(error) = self.classes.declare(declaration) {
            self.errors.push(error);
        }
        self
    }

    /// Declares a union. Its members are given by pickers.
    #[must_use]
    pub fn with_union(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match self.classes.declare(ClassDeclaration::new(name.clone())) {
            Ok(()) => {
                self.kinds.insert(name, ClassKind::Union);
            }
            Err(error) => self.errors.push(error),
        }
        self
    }

    /// Sets the loader of a class.
    #[must_use]
    pub fn with_loader(mut self, class: impl Into<String>, loader: impl TypeDataLoader + 'static) -> Self {
        self.kinds
            .insert(class.into(), ClassKind::Object(Arc::new(loader)));
        self
    }

    /// Attaches a field resolver to a class.
    #[must_use]
    pub fn with_resolver(
        mut self,
        class: impl Into<String>,
        resolver: impl FieldValueResolver + 'static,
        priority: i32,
    ) -> Self {
        self.field_resolvers
            .attach(class, Arc::new(resolver), priority);
        self
    }

    /// Attaches a directive to a class.
    #[must_use]
    pub fn with_directive(
        mut self,
        class: impl Into<String>,
        directive: impl DirectiveResolver + 'static,
        priority: i32,
    ) -> Self {
        self.directives.attach(class, Arc::new(directive), priority);
        self
    }

    /// Attaches a directive to every class.
    #[must_use]
    pub fn with_global_directive(mut self, directive: SharedDirective, priority: i32) -> Self {
        self.directives.attach(GLOBAL_CLASS, directive, priority);
        self
    }

    /// Attaches a picker to a union.
    #[must_use]
    pub fn with_picker(
        mut self,
        union: impl Into<String>,
        picker: impl TypeResolverPicker + 'static,
        priority: i32,
    ) -> Self {
        self.pickers.attach(union, Arc::new(picker), priority);
        self
    }

    /// Sets the class of the root object.
    #[must_use]
    pub fn with_root(mut self, class: impl Into<String>) -> Self {
        self.root = Some(class.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the store used for schema definitions when caching is on.
    #[must_use]
    pub fn with_cache(mut self, cache: impl CacheStore + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Checks the registrations and builds the engine.
    ///
    /// Every class that something is attached to must be declared, and
    /// every union member must have a loader. A root class without a
    /// loader gets a single object with ID [`ROOT_ID`].
    pub fn build(mut self) -> FqlResult<Engine> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        self.classes.validate()?;
        if self.config.max_drain_iterations == 0 {
            return Err(FqlError::InvalidConfig(
                "max_drain_iterations must be at least 1".to_string(),
            ));
        }

        let root = self.root.ok_or(FqlError::MissingRoot)?;
        if !self.classes.contains(&root) {
            return Err(FqlError::UnknownResolver(root));
        }
        if !self.kinds.contains_key(&root) {
            let loader = MemoryLoader::new().with_item(json!({ "id": ROOT_ID }));
            self.kinds
                .insert(root.clone(), ClassKind::Object(Arc::new(loader)));
        }

        let attached = self
            .kinds
            .keys()
            .chain(self.field_resolvers.classes())
            .chain(self.directives.classes())
            .chain(self.pickers.classes());
        for class in attached {
            if class != GLOBAL_CLASS && !self.classes.contains(class) {
                return Err(FqlError::UnknownResolver(class.clone()));
            }
        }
        for union in self.pickers.classes() {
            if !matches!(self.kinds.get(union), Some(ClassKind::Union)) {
                return Err(FqlError::UnknownResolver(union.clone()));
            }
            for (_, picker) in self.pickers.attached(union) {
                if !matches!(self.kinds.get(picker.target_class()), Some(ClassKind::Object(_))) {
                    return Err(FqlError::MissingLoader(picker.target_class().to_string()));
                }
            }
        }

        debug!(
            classes = self.classes.iter().count(),
            root = %root,
            "engine built"
        );
        Ok(Engine {
            syntax: Arc::new(self.config.syntax.clone()),
            config: self.config,
            classes: self.classes,
            kinds: self.kinds,
            field_resolvers: self.field_resolvers,
            directives: self.directives,
            pickers: self.pickers,
            root,
            cache: self.cache,
            definitions: Mutex::new(FxHashMap::default()),
            resolver_ids: Mutex::new(IndexMap::new()),
        })
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Inputs of one execution besides the query.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub variables: IndexMap<String, Value>,
    pub fragments: IndexMap<String, String>,
}

impl Request {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_fragment(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.fragments.insert(name.into(), definition.into());
        self
    }
}

/// The result of one execution.
///
/// Always complete: whatever could not be resolved is reported next to
/// what could.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// The root object with its requested fields.
    pub data: Value,
    /// Sections of the query that were dropped.
    pub query_errors: Vec<QueryError>,
    /// Feedback keyed by field or directive token.
    pub schema: Feedback,
    /// Feedback keyed by object ID, per class.
    pub items: IndexMap<String, ItemFeedback>,
    pub messages: IndexMap<String, Value>,
    /// Variables exported by directives.
    pub variables: IndexMap<String, Value>,
}

impl Response {
    /// Returns true if anything at all went wrong.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.query_errors.is_empty()
            || self.schema.has_errors()
            || self.items.values().any(ItemFeedback::has_errors)
    }

    /// Renders the response as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let query_errors: Vec<Value> = self
            .query_errors
            .iter()
            .map(|error| {
                json!({
                    "message": error.message,
                    "start": error.span.start,
                    "end": error.span.end,
                })
            })
            .collect();
        let mut out = Map::new();
        out.insert("data".to_string(), self.data.clone());
        if !query_errors.is_empty() {
            out.insert("queryErrors".to_string(), Value::Array(query_errors));
        }
        if !self.schema.is_empty() {
            out.insert("schema".to_string(), serde_json::to_value(&self.schema).unwrap_or_default());
        }
        if !self.items.is_empty() {
            out.insert("items".to_string(), serde_json::to_value(&self.items).unwrap_or_default());
        }
        if !self.messages.is_empty() {
            out.insert("messages".to_string(), json!(self.messages));
        }
        if !self.variables.is_empty() {
            out.insert("variables".to_string(), json!(self.variables));
        }
        Value::Object(out)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// One level of work: objects of one class and the fields asked of them.
struct Level {
    class: String,
    ids: Vec<String>,
    tree: QueryTree,
}

/// A relational field found while planning a level.
struct Relation {
    field: String,
    target: String,
    tree: QueryTree,
}

type Links = FxHashMap<(String, String), String>;

/// Resolves queries against the registered classes.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) syntax: Arc<QuerySyntax>,
    pub(crate) classes: ClassHierarchy,
    pub(crate) kinds: IndexMap<String, ClassKind>,
    pub(crate) field_resolvers: ExtensionRegistry<dyn FieldValueResolver>,
    pub(crate) directives: ExtensionRegistry<dyn DirectiveResolver>,
    pub(crate) pickers: ExtensionRegistry<dyn TypeResolverPicker>,
    root: String,
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
    pub(crate) definitions: Mutex<FxHashMap<String, SchemaDefinition>>,
    pub(crate) resolver_ids: Mutex<IndexMap<String, String>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("kinds", &self.kinds)
            .field("field_resolvers", &self.field_resolvers)
            .field("directives", &self.directives)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn syntax(&self) -> &QuerySyntax {
        &self.syntax
    }

    /// The class of the root object.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Executes a query.
    ///
    /// Fails only when the query reaches a class that cannot be resolved
    /// at all.
    pub fn execute(&self, query: &str, request: Request) -> FqlResult<Response> {
        let (tree, query_errors) = QueryConverter::new(&self.syntax).convert(query, &request.fragments);
        info!(
            fields = tree.len(),
            query_errors = query_errors.len(),
            "executing query"
        );

        let mut ctx = RequestContext::new(Arc::clone(&self.syntax), request.variables);
        let mut state = ExecutionState::new();
        let mut items: IndexMap<String, ItemFeedback> = IndexMap::new();
        let mut links = Links::default();

        let mut levels = VecDeque::from([Level {
            class: self.root.clone(),
            ids: vec![ROOT_ID.to_string()],
            tree: tree.clone(),
        }]);
        while let Some(level) = levels.pop_front() {
            let class = level.class.clone();
            let relations = self.run_level(&mut ctx, &mut state, level, &mut links)?;
            for relation in relations {
                let ids = related_ids(&state.db_items, &self.syntax.field_output_key(&relation.field));
                if !ids.is_empty() {
                    levels.push_back(Level {
                        class: relation.target,
                        ids,
                        tree: relation.tree,
                    });
                }
            }

            let resolved = std::mem::take(&mut state.db_items);
            let store = state.previous_db_items.entry(class.clone()).or_default();
            for (id, values) in resolved {
                store.entry(id).or_default().extend(values);
            }
            items
                .entry(class)
                .or_default()
                .merge(std::mem::take(&mut state.items));
        }

        let data = self.assemble_object(&self.root, ROOT_ID, &tree, &state.previous_db_items, &links);
        debug!(
            memoized_values = ctx.memoized_value_count(),
            "query executed"
        );
        Ok(Response {
            data,
            query_errors,
            schema: state.schema,
            items,
            messages: state.messages,
            variables: state.variables,
        })
    }

    fn run_level(
        &self,
        ctx: &mut RequestContext,
        state: &mut ExecutionState,
        level: Level,
        links: &mut Links,
    ) -> FqlResult<Vec<Relation>> {
        let resolver = FieldResolver::load(self, &level.class, &level.ids)?;
        for id in &level.ids {
            if resolver.object(id).is_some() {
                state.db_items.entry(id.clone()).or_default();
            } else {
                state.items.push(
                    Severity::Error,
                    id.as_str(),
                    "id",
                    format!("No object with ID '{id}' exists in class '{}'", level.class),
                );
            }
        }

        let mut relations = Vec::new();
        let data_fields = self.plan(&resolver, ctx, &level.tree, links, &mut relations)?;
        let ids_fields: IdsDataFields = level
            .ids
            .iter()
            .filter(|id| resolver.object(id).is_some())
            .map(|id| (id.clone(), data_fields.clone()))
            .collect();
        debug!(
            class = %level.class,
            objects = ids_fields.len(),
            fields = data_fields.direct.len(),
            relations = relations.len(),
            "resolving level"
        );
        resolver.resolve_fields(ctx, state, &ids_fields);
        Ok(relations)
    }

    /// Splits a tree level into direct fields, conditional fields and
    /// relations.
    ///
    /// A non-relational field with children makes its children
    /// conditional on it.
    fn plan(
        &self,
        resolver: &FieldResolver<'_>,
        ctx: &mut RequestContext,
        tree: &QueryTree,
        links: &mut Links,
        relations: &mut Vec<Relation>,
    ) -> FqlResult<DataFields> {
        let mut fields = DataFields::default();
        for (field, subtree) in tree.iter() {
            fields.push_direct(field);
            if subtree.is_empty() {
                continue;
            }
            match resolver.relational_target(ctx, field) {
                Some(target) => {
                    if !self.kinds.contains_key(&target) {
                        return Err(FqlError::UnknownResolver(target));
                    }
                    links.insert((resolver.class().to_string(), field.clone()), target.clone());
                    relations.push(Relation {
                        field: field.clone(),
                        target,
                        tree: subtree.clone(),
                    });
                }
                None => {
                    let conditional = self.plan(resolver, ctx, subtree, links, relations)?;
                    fields.conditional.insert(field.clone(), conditional);
                }
            }
        }
        Ok(fields)
    }

    fn assemble_object(
        &self,
        class: &str,
        id: &str,
        tree: &QueryTree,
        store: &IndexMap<String, DbItems>,
        links: &Links,
    ) -> Value {
        let Some(values) = store.get(class).and_then(|items| items.get(id)) else {
            return Value::Null;
        };
        let mut object = Map::new();
        self.assemble_fields(class, values, tree, store, links, &mut object);
        Value::Object(object)
    }

    fn assemble_fields(
        &self,
        class: &str,
        values: &DbObject,
        tree: &QueryTree,
        store: &IndexMap<String, DbItems>,
        links: &Links,
        out: &mut Map<String, Value>,
    ) {
        for (field, subtree) in tree.iter() {
            let key = self.syntax.field_output_key(field);
            let Some(value) = values.get(&key) else {
                continue;
            };
            match links.get(&(class.to_string(), field.clone())) {
                Some(target) => {
                    let related = self.assemble_related(target, value, subtree, store, links);
                    out.insert(key, related);
                }
                None => {
                    out.insert(key, value.clone());
                    self.assemble_fields(class, values, subtree, store, links, out);
                }
            }
        }
    }

    fn assemble_related(
        &self,
        class: &str,
        value: &Value,
        tree: &QueryTree,
        store: &IndexMap<String, DbItems>,
        links: &Links,
    ) -> Value {
        match value {
            Value::Array(ids) => Value::Array(
                ids.iter()
                    .map(|id| self.assemble_related(class, id, tree, store, links))
                    .collect(),
            ),
            other => match normalize_id(other) {
                Some(id) => self.assemble_object(class, &id, tree, store, links),
                None => Value::Null,
            },
        }
    }
}

/// IDs stored under `key`, in object order, without duplicates.
fn related_ids(db_items: &DbItems, key: &str) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Array(elements) => elements.iter().for_each(|element| collect(element, out)),
            other => {
                if let Some(id) = normalize_id(other) {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
    }

    let mut ids = Vec::new();
    for values in db_items.values() {
        if let Some(value) = values.get(key) {
            collect(value, &mut ids);
        }
    }
    ids
}
