//! JSON text-frame codec for [`Envelope`]s, plus the wire-value domain checks.
//!
//! Wire format: one envelope per frame, serialized as a serde-tagged JSON
//! object (see [`crate::protocol::envelope`]). The codec is the only place
//! where the wire-representable value domain is enforced:
//!
//! - [`encode`] validates every embedded value before serializing, so a bad
//!   value fails the single send it belongs to and nothing reaches the wire.
//! - [`decode`] turns a received frame back into an envelope; malformed input
//!   is a per-message [`ProtocolError`], recoverable by the session.
//! - [`to_wire`] converts an arbitrary `Serialize` value into the wire
//!   domain, which is where application values that JSON cannot express
//!   (non-string-keyed maps and the like) are rejected.
//!
//! The JSON value domain cannot express cycles; the depth limit bounds the
//! pathological nesting that a cyclic structure in a dynamic language would
//! produce.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::envelope::Envelope;

/// Maximum accepted frame size in bytes.
///
/// Frames above this are rejected on decode before any parsing happens.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Maximum nesting depth accepted for any wire value.
pub const MAX_VALUE_DEPTH: usize = 64;

/// A value fell outside the wire-representable JSON domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value at {path} is not wire-representable: {reason}")]
pub struct SerializationError {
    /// Path to the offending value, e.g. `args[2].profile`.
    pub path: String,
    /// What made the value unrepresentable.
    pub reason: String,
}

/// A received frame could not be turned into an envelope.
///
/// Per-message and recoverable: the session logs it and keeps processing
/// subsequent frames on the same channel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a valid tagged envelope.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame exceeds [`MAX_FRAME_BYTES`].
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    OversizedFrame { len: usize, max: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an envelope into a JSON text frame.
///
/// Every value embedded in the envelope is validated first; a violation
/// reports the offending path and aborts only this encode.
///
/// # Errors
///
/// Returns [`SerializationError`] if an embedded value violates the wire
/// domain or serialization itself fails.
pub fn encode(envelope: &Envelope) -> Result<String, SerializationError> {
    match envelope {
        Envelope::Invoke { args, .. } => {
            for (i, arg) in args.iter().enumerate() {
                check_value(arg, &format!("args[{i}]"))?;
            }
        }
        Envelope::Result { value, .. } => check_value(value, "value")?,
        Envelope::Event { payload, .. } => check_value(payload, "payload")?,
        Envelope::Error { .. } => {}
    }

    serde_json::to_string(envelope).map_err(|e| SerializationError {
        path: "$".to_string(),
        reason: e.to_string(),
    })
}

/// Decodes one envelope from a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::OversizedFrame`] for frames above
/// [`MAX_FRAME_BYTES`] and [`ProtocolError::Malformed`] for anything serde
/// cannot parse as a tagged envelope.
pub fn decode(frame: &str) -> Result<Envelope, ProtocolError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::OversizedFrame {
            len: frame.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Converts an application value into the wire value domain.
///
/// This is the boundary where values JSON cannot express are rejected: maps
/// with non-string keys, types with failing `Serialize` impls, and so on.
///
/// # Errors
///
/// Returns [`SerializationError`] naming the failure; the path is `$` when
/// serde rejects the value before a wire shape exists.
pub fn to_wire<T: Serialize>(value: &T) -> Result<Value, SerializationError> {
    let wire = serde_json::to_value(value).map_err(|e| SerializationError {
        path: "$".to_string(),
        reason: e.to_string(),
    })?;
    check_value(&wire, "$")?;
    Ok(wire)
}

/// Validates that `value` stays within the wire domain, reporting the
/// offending path on violation.
///
/// The only structural constraint a [`Value`] can still violate is the
/// nesting depth bound; numbers, strings, and key types are already enforced
/// by the `Value` representation itself.
pub fn check_value(value: &Value, path: &str) -> Result<(), SerializationError> {
    check_depth(value, path, 0)
}

fn check_depth(value: &Value, path: &str, depth: usize) -> Result<(), SerializationError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(SerializationError {
            path: path.to_string(),
            reason: format!("nesting deeper than {MAX_VALUE_DEPTH} levels"),
        });
    }

    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                check_depth(item, &format!("{path}[{i}]"), depth + 1)?;
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                check_depth(item, &format!("{path}.{key}"), depth + 1)?;
            }
        }
        // Null, booleans, numbers, and strings are always representable.
        _ => {}
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
