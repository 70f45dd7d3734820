//! Envelope Codec Module
//!
//! Serializes computed results to and from the stored `{"value": ...}` envelope,
//! with a choice between standard and lossless numeric decoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

use crate::error::Result;

// == Numeric Mode ==
/// Numeric handling applied when decoding a stored envelope.
///
/// Standard mode folds every number to a double, so integers above 2^53 lose
/// precision. Lossless mode keeps integer tokens as native integers while
/// floating tokens decode as doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericMode {
    #[default]
    Standard,
    Lossless,
}

// == Envelope ==
/// Wrapper structure stored for every present cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
}

// == Encode ==
/// Encodes a value into the envelope representation.
///
/// Returns `None` when the value cannot be serialized or serializes to a null
/// document (serde_json writes non-finite floats as `null` instead of
/// failing). Callers must treat `None` as "do not cache this result" and
/// delete any prior entry at the key.
pub fn encode<T: Serialize>(value: &T) -> Option<String> {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(err) => {
            warn!("Value not serializable, skipping cache write: {}", err);
            return None;
        }
    };

    if value.is_null() {
        warn!("Value serialized to null, skipping cache write");
        return None;
    }

    serde_json::to_string(&Envelope { value }).ok()
}

// == Decode ==
/// Decodes a stored envelope back into a value.
///
/// Fails with a parse error when the payload is not a well-formed envelope.
///
/// # Arguments
/// * `payload` - The stored envelope text
/// * `mode` - Numeric handling for the decode pass
pub fn decode<T: DeserializeOwned>(payload: &str, mode: NumericMode) -> Result<T> {
    let envelope: Envelope<Value> = serde_json::from_str(payload)?;

    let value = match mode {
        NumericMode::Standard => fold_numbers(envelope.value),
        NumericMode::Lossless => envelope.value,
    };

    Ok(serde_json::from_value(value)?)
}

/// Recursively folds every number in the tree through a double.
///
/// Integral doubles are re-emitted as integers so ordinary counters and ids
/// survive a typed decode; only values outside double-exact range are altered.
fn fold_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            let Some(f) = n.as_f64() else {
                return Value::Null;
            };
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.2e18 {
                Value::Number(Number::from(f as i64))
            } else {
                Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(fold_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, fold_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}
