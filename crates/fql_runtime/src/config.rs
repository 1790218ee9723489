//! Engine configuration.

use fql_syntax::QuerySyntax;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stop processing the remaining directives of a drain iteration as
    /// soon as one directive fails to resolve or validate.
    pub stop_pipeline_on_directive_failure: bool,
    /// Cache schema definitions in the configured cache store.
    pub use_cache: bool,
    /// Lifetime of cached entries. `None` keeps them forever.
    pub cache_ttl_secs: Option<u64>,
    /// Directives prepended to every field's directive chain.
    pub mandatory_directives: Vec<String>,
    /// Upper bound on drain-loop iterations per batch. Must be at least 1.
    pub max_drain_iterations: usize,
    /// Reserved symbols of the query grammar.
    pub syntax: QuerySyntax,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_pipeline_on_directive_failure: false,
            use_cache: false,
            cache_ttl_secs: None,
            mandatory_directives: vec!["validate".to_string(), "resolveValueAndMerge".to_string()],
            max_drain_iterations: 256,
            syntax: QuerySyntax::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a directive failure stops the rest of the iteration.
    #[must_use]
    pub fn with_stop_pipeline_on_directive_failure(mut self, stop: bool) -> Self {
        self.stop_pipeline_on_directive_failure = stop;
        self
    }

    /// Enables the schema cache.
    #[must_use]
    pub fn with_cache(mut self, ttl_secs: Option<u64>) -> Self {
        self.use_cache = true;
        self.cache_ttl_secs = ttl_secs;
        self
    }

    /// Replaces the mandatory directives.
    #[must_use]
    pub fn with_mandatory_directives(mut self, directives: Vec<String>) -> Self {
        self.mandatory_directives = directives;
        self
    }

    /// Sets the drain-loop iteration limit.
    #[must_use]
    pub fn with_max_drain_iterations(mut self, iterations: usize) -> Self {
        self.max_drain_iterations = iterations;
        self
    }

    /// Sets the grammar.
    #[must_use]
    pub fn with_syntax(mut self, syntax: QuerySyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Returns the cache TTL as a duration.
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.stop_pipeline_on_directive_failure);
        assert!(!config.use_cache);
        assert_eq!(
            config.mandatory_directives,
            vec!["validate", "resolveValueAndMerge"]
        );
        assert_eq!(config.max_drain_iterations, 256);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"use_cache": true, "cache_ttl_secs": 60, "syntax": {"alias_prefix": 35}}"#,
        )
        .unwrap();
        assert!(config.use_cache);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.syntax.alias_prefix, b'#');
        assert_eq!(config.syntax.args_open, b'(');
        assert_eq!(config.max_drain_iterations, 256);
    }
}
