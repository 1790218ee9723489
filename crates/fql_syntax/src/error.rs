//! Query syntax errors.

use crate::lexer::LexError;
use fql_core::Span;
use thiserror::Error;

/// A problem found while reading a field or query string.
///
/// Query errors never abort a request: the offending field or section is
/// dropped and the error is reported next to whatever did resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    /// Human-readable message.
    pub message: String,
    /// The offending text, relative to the string that was parsed.
    pub span: Span,
}

impl QueryError {
    /// Creates an error covering `span`.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Creates an error covering all of `text`.
    pub fn covering(message: impl Into<String>, text: &str) -> Self {
        Self::new(message, Span::of(text))
    }

    /// Wraps a balance error found in `text`.
    pub fn unbalanced(text: &str, error: &LexError) -> Self {
        Self::covering(format!("Field '{text}' is malformed: {error}"), text)
    }
}

/// Result alias for syntax operations.
pub type QueryResult<T> = Result<T, QueryError>;
