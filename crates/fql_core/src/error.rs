//! Hard failures.
//!
//! Validation problems never surface here; they are accumulated as
//! [`Feedback`](crate::Feedback). These errors are for wiring mistakes
//! that make a request impossible to serve at all.

use miette::Diagnostic;
use thiserror::Error;

/// An unrecoverable engine error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum FqlError {
    /// A relational field or the root points at a class that has no resolver.
    #[error("no field resolver is registered for class `{0}`")]
    #[diagnostic(
        code(fql::unknown_resolver),
        help("declare the class and attach a data loader before building the engine")
    )]
    UnknownResolver(String),

    /// A class declares a parent or interface that was never declared.
    #[error("class `{class}` extends undeclared class `{parent}`")]
    #[diagnostic(code(fql::undeclared_class))]
    UndeclaredClass { class: String, parent: String },

    /// A class was declared twice.
    #[error("class `{0}` is declared more than once")]
    #[diagnostic(code(fql::duplicate_class))]
    DuplicateClass(String),

    /// The engine was built without a root class.
    #[error("no root class has been configured")]
    #[diagnostic(code(fql::missing_root))]
    MissingRoot,

    /// A concrete class has no data loader.
    #[error("no data loader is registered for class `{0}`")]
    #[diagnostic(code(fql::missing_loader))]
    MissingLoader(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(fql::invalid_config))]
    InvalidConfig(String),
}

/// Result alias for hard failures.
pub type FqlResult<T> = Result<T, FqlError>;
