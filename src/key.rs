//! Cache Key Module
//!
//! Derives deterministic string keys from a namespace prefix and serialized
//! call arguments.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Key Derivation ==
/// Derives the cache key for a prefix and a set of call arguments.
///
/// Arguments are serialized to canonical JSON; `serde_json` object maps are
/// BTreeMap-backed, so field order is sorted and two equal argument sets always
/// produce the same key. Calls without arguments (unit, null, or an empty
/// array) use the prefix alone.
///
/// # Arguments
/// * `prefix` - Namespace prefix, must be non-empty
/// * `args` - Serializable call arguments
pub fn derive_key<A: Serialize>(prefix: &str, args: &A) -> Result<String> {
    if prefix.is_empty() {
        return Err(CacheError::InvalidKey("empty prefix".to_string()));
    }

    let value = serde_json::to_value(args)?;
    if is_empty_args(&value) {
        return Ok(prefix.to_string());
    }

    Ok(format!("{}_{}", prefix, serde_json::to_string(&value)?))
}

/// Returns true when the serialized arguments carry no key material.
fn is_empty_args(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
