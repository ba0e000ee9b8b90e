//! Deep merge engine for untyped value trees
//!
//! Two policies over nested `serde_json::Value` mappings:
//!
//! - [`merge`] is base-preserving: the overwrite tree wins conflicts, the
//!   base fills gaps. Used where externally-owned keys in live objects must
//!   survive (e.g. user-supplied chart overrides).
//! - [`merge_with_deletion`] is authoritative: the desired tree defines the
//!   complete key set and keys absent from it are dropped even when present
//!   in the existing tree. Used where stale keys must be garbage-collected
//!   (e.g. feature toggles).
//!
//! Both are pure: inputs are never mutated, results are fresh copies, and
//! mismatched shapes degrade to "higher-precedence side wins" with a warning
//! rather than an error.

use serde_json::Value;
use tracing::warn;

use crate::error::Error;

/// Merge `overwrite` over `base`, preserving base keys absent from overwrite.
///
/// Rules, applied recursively:
/// - an empty or null `overwrite` returns `base` unchanged;
/// - keys only in `base` are copied into the result verbatim;
/// - keys in both where both values are mappings are merged recursively
///   with `overwrite` taking precedence for scalar conflicts;
/// - shape mismatches (mapping vs non-mapping) keep `overwrite`'s value and
///   log a warning. A `null` in `overwrite` colliding with a mapping in
///   `base` is kept as `null` — precedence is uniform, there is no deletion
///   special case in this policy.
///
/// Fails only when a non-null input is not a mapping at the top level.
pub fn merge(base: &Value, overwrite: &Value) -> Result<Value, Error> {
    if overwrite.is_null() {
        return Ok(base.clone());
    }
    if let Some(map) = overwrite.as_object() {
        if map.is_empty() {
            return Ok(base.clone());
        }
    }
    if base.is_null() {
        return ensure_mapping(overwrite).map(|m| Value::Object(m.clone()));
    }

    let base_map = ensure_mapping(base)?;
    let overwrite_map = ensure_mapping(overwrite)?;

    let mut result = overwrite_map.clone();
    for (key, base_value) in base_map {
        match result.get_mut(key) {
            None => {
                // Base fills gaps
                result.insert(key.clone(), base_value.clone());
            }
            Some(result_value) => {
                if base_value.is_object() && result_value.is_object() {
                    let merged = merge(base_value, result_value)?;
                    *result_value = merged;
                } else if base_value.is_object() != result_value.is_object() {
                    warn!(
                        key = %key,
                        "type mismatch while merging, keeping overwrite value"
                    );
                }
                // Scalar/sequence conflict: overwrite side already in place
            }
        }
    }

    Ok(Value::Object(result))
}

/// Merge `desired` against `existing` with deletion semantics.
///
/// The desired tree is the sole source of truth: the result's key set at
/// every level is exactly the desired tree's key set, so keys present only
/// in `existing` never appear. Nested mappings present in both are
/// reconciled recursively; any scalar or shape conflict resolves to the
/// desired value without recursion.
pub fn merge_with_deletion(desired: &Value, existing: &Value) -> Result<Value, Error> {
    if desired.is_null() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let desired_map = ensure_mapping(desired)?;
    let existing_map = match existing {
        Value::Null => None,
        other => Some(ensure_mapping(other)?),
    };

    let mut result = desired_map.clone();
    if let Some(existing_map) = existing_map {
        for (key, desired_value) in desired_map {
            if let Some(existing_value) = existing_map.get(key) {
                if desired_value.is_object() && existing_value.is_object() {
                    let merged = merge_with_deletion(desired_value, existing_value)?;
                    result.insert(key.clone(), merged);
                }
                // Conflicting shapes or scalars: desired already in place
            }
        }
    }

    Ok(Value::Object(result))
}

fn ensure_mapping(value: &Value) -> Result<&serde_json::Map<String, Value>, Error> {
    value
        .as_object()
        .ok_or_else(|| Error::merge(format!("expected a mapping, got {}", type_name(value))))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
