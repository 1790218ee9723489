//! Syntax layer for the field query engine.
//!
//! This crate provides:
//! - `symbols`: The reserved symbols of the grammar
//! - `lexer`: Nesting-aware splitting and searching
//! - `field`: Field and directive decomposition and composition
//! - `value`: Argument value classification
//! - `query`: Query string to field tree conversion

pub mod error;
pub mod field;
pub mod lexer;
pub mod query;
pub mod symbols;
pub mod value;

pub use error::{QueryError, QueryResult};
pub use field::FieldParts;
pub use lexer::{Boundary, LexError};
pub use query::{QueryConverter, QueryTree};
pub use symbols::QuerySyntax;
pub use value::ArgValue;
