//! The canonical value type stages exchange through a context.
//!
//! The engine does not mandate a wire format beyond "serializable to a
//! canonical byte form" (see the crate-level docs on [`canonical`]).
//! `CtxValue` is a thin alias over [`serde_json::Value`]: it is already
//! a stable, well-understood superset of the JSON data model, and every
//! stage author already has a `serde`-compatible type to convert into
//! and out of it via [`serde_json::to_value`]/[`serde_json::from_value`].

/// An opaque value flowing through an [`crate::context::ExecutionContext`]:
/// the pipeline's `input`, a stage's `output`, a `shared` entry, or a
/// `messages` record.
pub type CtxValue = serde_json::Value;

/// Canonicalization used for cache keys and checkpoint snapshots.
///
/// The encoder must be deterministic and stable across invocations: the
/// same logical value always produces the same bytes, regardless of the
/// order fields were inserted in. `serde_json::Value`'s `Object` variant
/// is a `BTreeMap` under the hood in recent `serde_json` releases is not
/// guaranteed, so this module sorts object keys explicitly rather than
/// relying on incidental map ordering.
pub mod canonical {
    use super::CtxValue;
    use stagekit_error::StagekitError;

    /// Recursively reorder every object's keys so the result serializes
    /// identically regardless of insertion order. Arrays are left in
    /// place: their order is semantically meaningful.
    #[must_use]
    pub fn normalize(value: &CtxValue) -> CtxValue {
        match value {
            CtxValue::Object(map) => {
                let mut sorted: Vec<_> = map.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::new();
                for (k, v) in sorted {
                    out.insert(k.clone(), normalize(v));
                }
                CtxValue::Object(out)
            }
            CtxValue::Array(items) => CtxValue::Array(items.iter().map(normalize).collect()),
            other => other.clone(),
        }
    }

    /// Encode a value to its canonical byte form.
    ///
    /// Values containing floats are rejected (variable-precision floats
    /// would make the encoding non-deterministic across platforms); such
    /// values should bypass caching/checkpointing per the engine's
    /// "unserializable inputs bypass the cache rather than fail" policy,
    /// which callers implement by treating an `Err` here as a cache miss
    /// rather than a hard failure.
    pub fn encode(value: &CtxValue) -> Result<Vec<u8>, StagekitError> {
        if contains_float(value) {
            return Err(StagekitError::other(
                "value contains a float; not canonicalizable",
                false,
            ));
        }
        serde_json::to_vec(&normalize(value)).map_err(StagekitError::from)
    }

    /// A stable hex digest of a value's canonical encoding, suitable for
    /// use as a cache key component.
    pub fn digest(value: &CtxValue) -> Result<String, StagekitError> {
        let bytes = encode(value)?;
        Ok(bytes.iter().fold(String::new(), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        }))
    }

    fn contains_float(value: &CtxValue) -> bool {
        match value {
            CtxValue::Number(n) => n.is_f64() && !n.is_i64() && !n.is_u64(),
            CtxValue::Array(items) => items.iter().any(contains_float),
            CtxValue::Object(map) => map.values().any(contains_float),
            _ => false,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn normalize_sorts_object_keys() {
            let a = json!({"b": 1, "a": 2});
            let b = json!({"a": 2, "b": 1});
            assert_eq!(
                serde_json::to_string(&normalize(&a)).unwrap(),
                serde_json::to_string(&normalize(&b)).unwrap()
            );
        }

        #[test]
        fn encode_is_stable_regardless_of_insertion_order() {
            let a = json!({"z": [1,2,3], "a": "hello"});
            let b = json!({"a": "hello", "z": [1,2,3]});
            assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
        }

        #[test]
        fn floats_are_rejected() {
            let v = json!({"x": 1.5});
            assert!(encode(&v).is_err());
        }

        #[test]
        fn integral_floats_are_not_rejected() {
            // serde_json represents whole numbers without a fractional
            // part as integers internally when parsed from an integer
            // literal; constructing from `json!` keeps that behavior.
            let v = json!({"x": 5});
            assert!(encode(&v).is_ok());
        }

        #[test]
        fn digest_is_deterministic() {
            let v = json!({"a": 1, "b": [1,2]});
            assert_eq!(digest(&v).unwrap(), digest(&v).unwrap());
        }
    }
}
