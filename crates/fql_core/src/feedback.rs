//! Accumulated feedback for field and directive resolution.
//!
//! Nothing in the resolution pipeline throws for an expected failure.
//! Errors, warnings and deprecations are appended to maps keyed either by
//! the field/directive token that produced them or by result-item ID, and
//! the maps only ever grow.

use indexmap::IndexMap;
#[cfg(feature = "serde")]
use serde::Serialize;

/// Feedback severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    /// The field or directive is excluded from further processing.
    Error,
    /// Processing continues; the value may have been dropped.
    Warning,
    /// Processing is unaffected.
    Deprecation,
}

impl Severity {
    /// Returns the lowercase label used in responses and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Deprecation => "deprecation",
        }
    }
}

/// Messages keyed by a field or directive token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FeedbackMap {
    entries: IndexMap<String, Vec<String>>,
}

impl FeedbackMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message under `key`.
    pub fn push(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(message.into());
    }

    /// Appends every message of `other`, keeping key order.
    pub fn merge(&mut self, other: FeedbackMap) {
        for (key, messages) in other.entries {
            self.entries.entry(key).or_default().extend(messages);
        }
    }

    /// Returns the messages recorded under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Returns true if `key` has at least one message.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over `(key, messages)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no message has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the total number of messages across all keys.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Schema-level feedback: one map per severity, keyed by token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Feedback {
    pub errors: FeedbackMap,
    pub warnings: FeedbackMap,
    pub deprecations: FeedbackMap,
}

impl Feedback {
    /// Creates empty feedback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the map for a severity.
    #[must_use]
    pub fn map(&self, severity: Severity) -> &FeedbackMap {
        match severity {
            Severity::Error => &self.errors,
            Severity::Warning => &self.warnings,
            Severity::Deprecation => &self.deprecations,
        }
    }

    /// Returns the mutable map for a severity.
    pub fn map_mut(&mut self, severity: Severity) -> &mut FeedbackMap {
        match severity {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Deprecation => &mut self.deprecations,
        }
    }

    /// Appends a message of the given severity under `key`.
    pub fn push(&mut self, severity: Severity, key: impl Into<String>, message: impl Into<String>) {
        self.map_mut(severity).push(key, message);
    }

    /// Appends all of `other`.
    pub fn merge(&mut self, other: Feedback) {
        self.errors.merge(other.errors);
        self.warnings.merge(other.warnings);
        self.deprecations.merge(other.deprecations);
    }

    /// Returns true if any error has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.deprecations.is_empty()
    }
}

/// Messages keyed by result-item ID, then by field token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ItemFeedbackMap {
    entries: IndexMap<String, FeedbackMap>,
}

impl ItemFeedbackMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message for `field` of item `id`.
    pub fn push(
        &mut self,
        id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.entries
            .entry(id.into())
            .or_default()
            .push(field, message);
    }

    /// Appends every message of `other`.
    pub fn merge(&mut self, other: ItemFeedbackMap) {
        for (id, fields) in other.entries {
            self.entries.entry(id).or_default().merge(fields);
        }
    }

    /// Returns the per-field messages of item `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&FeedbackMap> {
        self.entries.get(id)
    }

    /// Returns the messages for `field` of item `id`.
    #[must_use]
    pub fn for_field(&self, id: &str, field: &str) -> Option<&[String]> {
        self.entries.get(id).and_then(|fields| fields.get(field))
    }

    /// Iterates over `(id, per-field messages)`.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeedbackMap)> {
        self.entries.iter()
    }

    /// Returns true if no message has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Item-level feedback: one map per severity, keyed by item ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ItemFeedback {
    pub errors: ItemFeedbackMap,
    pub warnings: ItemFeedbackMap,
    pub deprecations: ItemFeedbackMap,
}

impl ItemFeedback {
    /// Creates empty feedback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutable map for a severity.
    pub fn map_mut(&mut self, severity: Severity) -> &mut ItemFeedbackMap {
        match severity {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Deprecation => &mut self.deprecations,
        }
    }

    /// Appends a message of the given severity for `field` of item `id`.
    pub fn push(
        &mut self,
        severity: Severity,
        id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.map_mut(severity).push(id, field, message);
    }

    /// Appends all of `other`.
    pub fn merge(&mut self, other: ItemFeedback) {
        self.errors.merge(other.errors);
        self.warnings.merge(other.warnings);
        self.deprecations.merge(other.deprecations);
    }

    /// Returns true if any error has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
