//! Cache key derivation and the serializable snapshot stored under it.
//!
//! Unserializable inputs (e.g. containing a float) bypass the cache
//! rather than fail the execution; callers treat `cache_key` returning
//! `None` as "do not consult the cache for this input."

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stagekit_core::value::{canonical, CtxValue};
use stagekit_error::StagekitError;

/// Derive the cache key for `{pipeline_name, canonicalHash(input)}`, or
/// `None` if `input` cannot be canonicalized.
#[must_use]
pub fn cache_key(pipeline_name: &str, input: &CtxValue) -> Option<String> {
    canonical::digest(input)
        .ok()
        .map(|digest| format!("{pipeline_name}:{digest}"))
}

/// A serializable snapshot of a `PipelineResult`, sufficient to
/// reconstruct a result "byte-identical" to the one that was cached
/// without needing to reconstruct a live
/// `ExecutionContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    /// Mirrors `PipelineResult::success`.
    pub success: bool,
    /// Mirrors `PipelineResult::output`.
    pub output: Option<CtxValue>,
    /// Mirrors `PipelineResult::error`.
    pub error: Option<StagekitError>,
    /// Mirrors `PipelineResult::stage_results`.
    pub stage_results: BTreeMap<String, stagekit_core::result::StageResult>,
}
