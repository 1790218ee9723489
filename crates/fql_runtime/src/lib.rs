//! Runtime for the field query engine.
//!
//! This crate provides:
//! - `registry`: Class hierarchy and prioritized extension registries
//! - `schema`: Field and argument types
//! - `cast`: Argument value casting
//! - `interpreter`: Schema-time and per-item argument resolution
//! - `resolver`: Field value resolvers
//! - `loader`: Data loaders
//! - `union`: Union classes and their pickers
//! - `directive`: The directive API
//! - `pipeline`: Ordered directive stages
//! - `field_resolver`: The directive drain loop for one class
//! - `directives`: Built-in directives
//! - `context`: Request-scoped memo tables and execution state
//! - `definition`: Schema definitions with a recursion guard
//! - `cache`: Cache store for schema definitions
//! - `config`: Engine configuration
//! - `engine`: Registration and level-by-level execution

pub mod cache;
pub mod cast;
pub mod config;
pub mod context;
pub mod definition;
pub mod directive;
pub mod directives;
pub mod engine;
pub mod field_resolver;
pub mod interpreter;
pub mod loader;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod union;

pub use cache::{CacheStore, MemoryCache};
pub use config::EngineConfig;
pub use context::{DataFields, ExecutionState, IdsDataFields, RequestContext};
pub use definition::{DirectiveSchema, FieldSchema, SchemaDefinition};
pub use directive::{
    DirectiveInstance, DirectiveResolver, PipelinePosition, SharedDirective, StageContext,
};
pub use directives::builtin_directives;
pub use engine::{Engine, EngineBuilder, Request, Response, ROOT_ID};
pub use field_resolver::FieldResolver;
pub use interpreter::{ArgInput, DeferredArg, FieldQueryInterpreter, ItemArgs, SchemaArgs};
pub use loader::{MemoryLoader, TypeDataLoader};
pub use pipeline::{DirectivePipeline, Stage, SucceedingStages};
pub use registry::{ClassDeclaration, ClassHierarchy, ExtensionId, ExtensionRegistry, GLOBAL_CLASS};
pub use resolver::{
    FieldArgs, FieldValueResolver, FnFieldResolver, PropertyResolver, ResolveError, ResolveResult,
};
pub use schema::{ArgDefinition, FieldDefinition, ScalarType, TypeRef};
pub use union::{FnPicker, TypeResolverPicker};

pub use fql_core::{Feedback, FqlError, FqlResult, ItemFeedback, Severity};
