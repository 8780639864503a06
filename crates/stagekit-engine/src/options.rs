//! `PipelineOptions`: the knobs recognized by `Pipeline::builder`.
//!
//! Doubles as a configuration struct an embedder can populate from
//! environment/TOML via `serde` — this crate does not depend on a
//! config *crate* itself, only on `serde` derives.

use serde::{Deserialize, Serialize};

/// Default per-stage timeout when neither the stage nor the pipeline
/// overrides it: 300,000 ms (5 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Default pipeline-level cache TTL: 3,600,000 ms (1 hour).
pub const DEFAULT_CACHE_TTL_MS: u64 = 3_600_000;

/// Options governing one pipeline's behavior, set once at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Identifier used in metrics/events/cache keys. The only required
    /// field.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Milliseconds applied to a stage that does not set its own
    /// timeout.
    pub default_timeout_ms: u64,
    /// If true, a failed stage does not abort the sequence.
    pub continue_on_error: bool,
    /// Default `maxConcurrency` for parallel combinators declared
    /// inside this pipeline.
    pub max_concurrency: Option<usize>,
    /// If true, the pipeline-level result cache is consulted.
    pub enable_caching: bool,
    /// TTL, in milliseconds, applied to cached results.
    pub cache_ttl_ms: u64,
    /// If true, lifecycle events are published to subscribers.
    pub enable_streaming: bool,
}

impl PipelineOptions {
    /// Start from just a name; every other field takes its documented
    /// default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            continue_on_error: false,
            max_concurrency: None,
            enable_caching: false,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            enable_streaming: false,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the default per-stage timeout.
    #[must_use]
    pub fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = ms;
        self
    }

    /// Set `continueOnError`.
    #[must_use]
    pub fn with_continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }

    /// Set the default `maxConcurrency`.
    #[must_use]
    pub fn with_max_concurrency(mut self, value: usize) -> Self {
        self.max_concurrency = Some(value);
        self
    }

    /// Enable the pipeline-level result cache with the given TTL.
    #[must_use]
    pub fn with_caching(mut self, cache_ttl_ms: u64) -> Self {
        self.enable_caching = true;
        self.cache_ttl_ms = cache_ttl_ms;
        self
    }

    /// Enable event streaming.
    #[must_use]
    pub fn with_streaming(mut self) -> Self {
        self.enable_streaming = true;
        self
    }

    /// `default_timeout_ms` as a [`std::time::Duration`].
    #[must_use]
    pub fn default_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.default_timeout_ms)
    }

    /// `cache_ttl_ms` as a [`std::time::Duration`].
    #[must_use]
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cache_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = PipelineOptions::new("p");
        assert_eq!(opts.default_timeout_ms, 300_000);
        assert_eq!(opts.cache_ttl_ms, 3_600_000);
        assert!(!opts.continue_on_error);
        assert!(!opts.enable_caching);
    }

    #[test]
    fn json_roundtrip() {
        let opts = PipelineOptions::new("p").with_caching(1000);
        let json = serde_json::to_string(&opts).unwrap();
        let back: PipelineOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "p");
        assert!(back.enable_caching);
    }
}
