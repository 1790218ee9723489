//! Core utilities for the field query engine.
//!
//! This crate provides the types shared by the syntax and runtime layers:
//! - `span`: Byte ranges into a query string
//! - `feedback`: Error/warning/deprecation accumulators
//! - `error`: Hard failures

pub mod error;
pub mod feedback;
pub mod span;

pub use error::{FqlError, FqlResult};
pub use feedback::{Feedback, FeedbackMap, ItemFeedback, ItemFeedbackMap, Severity};
pub use span::Span;
