//! The wire envelope: the tagged message union exchanged over a bridge channel.
//!
//! Every discrete protocol message is one of four envelope variants:
//!
//! - [`Envelope::Invoke`]: "run the function exposed under `name` with `args`".
//! - [`Envelope::Result`]: successful reply to a previously sent `Invoke`.
//! - [`Envelope::Error`]: failed reply to a previously sent `Invoke`.
//! - [`Envelope::Event`]: fire-and-forget notification, no reply expected.
//!
//! # JSON discriminant
//!
//! Every envelope is a JSON object with a `"type"` field identifying the
//! variant; all other fields are flattened into the same object:
//!
//! ```json
//! {"type":"Invoke","id":7,"name":"add","args":[2,3]}
//! {"type":"Result","id":7,"value":5}
//! {"type":"Error","id":8,"error_kind":"name_not_found","message":"no function named 'missing'"}
//! {"type":"Event","name":"tick","payload":{"n":1}}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically.
//!
//! # Correlation invariant
//!
//! An `id` carried by `Invoke` is unique for the lifetime of the session from
//! the sender's perspective. A `Result` or `Error` must reference an id the
//! other side previously sent as `Invoke`; an unknown id is a protocol
//! violation that the receiver logs and ignores.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id linking an `Invoke` to its eventual `Result`/`Error`.
///
/// Allocated from a monotonic per-session counter, so ids are never reused
/// within one session (see `protocol::correlator::IdCounter`).
pub type CallId = u64;

/// One discrete protocol message exchanged over the duplex channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Request to invoke the function exposed under `name` on the other side.
    Invoke {
        /// Fresh correlation id, unique per session from the sender's view.
        id: CallId,
        /// Name the target side exposed the function under.
        name: String,
        /// Positional arguments, each within the JSON value domain.
        args: Vec<Value>,
    },

    /// Successful completion of the invocation identified by `id`.
    Result {
        /// Correlation id of the `Invoke` this replies to.
        id: CallId,
        /// The handler's return value.
        value: Value,
    },

    /// Failed completion of the invocation identified by `id`.
    Error {
        /// Correlation id of the `Invoke` this replies to.
        id: CallId,
        /// Machine-readable failure category.
        error_kind: ErrorKind,
        /// Human-readable message, preserved from the failing side.
        message: String,
    },

    /// Fire-and-forget notification; independent of any call/response pair.
    Event {
        /// Event name subscribers registered under.
        name: String,
        /// Event payload, within the JSON value domain.
        payload: Value,
    },
}

impl Envelope {
    /// Short variant name for log messages.
    ///
    /// Deliberately excludes field values so argument payloads never leak
    /// into logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Envelope::Invoke { .. } => "Invoke",
            Envelope::Result { .. } => "Result",
            Envelope::Error { .. } => "Error",
            Envelope::Event { .. } => "Event",
        }
    }
}

/// Machine-readable failure categories carried by `Error` envelopes.
///
/// The same taxonomy is used locally (see `CallError` and `InvokeError`), so
/// a failure keeps its category when it crosses the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A value fell outside the wire-representable JSON domain.
    Serialization,
    /// A malformed or out-of-sequence envelope was received.
    Protocol,
    /// An invocation named a function the target side never exposed.
    NameNotFound,
    /// An exposed handler reported a failure; its message is preserved.
    Handler,
    /// The session closed before the call could complete.
    ConnectionClosed,
}

impl ErrorKind {
    /// The wire spelling of this kind (the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Serialization => "serialization",
            ErrorKind::Protocol => "protocol",
            ErrorKind::NameNotFound => "name_not_found",
            ErrorKind::Handler => "handler",
            ErrorKind::ConnectionClosed => "connection_closed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoke_serializes_with_type_discriminant() {
        // Arrange
        let env = Envelope::Invoke {
            id: 7,
            name: "add".to_string(),
            args: vec![json!(2), json!(3)],
        };

        // Act
        let text = serde_json::to_string(&env).unwrap();

        // Assert: the `"type"` field must be present and equal to the variant name
        assert!(text.contains(r#""type":"Invoke""#));
        assert!(text.contains(r#""name":"add""#));
        assert!(text.contains(r#""id":7"#));
    }

    #[test]
    fn test_invoke_round_trips() {
        let original = Envelope::Invoke {
            id: 42,
            name: "compute".to_string(),
            args: vec![json!({"nested": {"value": true}}), json!(null)],
        };
        let text = serde_json::to_string(&original).unwrap();
        let decoded: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_result_round_trips() {
        let original = Envelope::Result {
            id: 42,
            value: json!([1, "two", 3.5]),
        };
        let text = serde_json::to_string(&original).unwrap();
        let decoded: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_error_kind_uses_snake_case_on_the_wire() {
        let original = Envelope::Error {
            id: 3,
            error_kind: ErrorKind::NameNotFound,
            message: "no function named 'missing'".to_string(),
        };
        let text = serde_json::to_string(&original).unwrap();
        assert!(text.contains(r#""error_kind":"name_not_found""#));

        let decoded: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_event_round_trips() {
        let original = Envelope::Event {
            name: "tick".to_string(),
            payload: json!({"n": 1}),
        };
        let text = serde_json::to_string(&original).unwrap();
        let decoded: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_unknown_type_returns_error() {
        let text = r#"{"type":"Bogus","id":1}"#;
        let result: Result<Envelope, _> = serde_json::from_str(text);
        assert!(result.is_err(), "unknown type must fail deserialization");
    }

    #[test]
    fn test_missing_type_field_returns_error() {
        let text = r#"{"id":1,"name":"add","args":[]}"#;
        let result: Result<Envelope, _> = serde_json::from_str(text);
        assert!(result.is_err(), "missing 'type' field must fail deserialization");
    }

    #[test]
    fn test_type_name_excludes_field_values() {
        let env = Envelope::Invoke {
            id: 1,
            name: "secret_fn".to_string(),
            args: vec![json!("secret-argument")],
        };
        let name = env.type_name();
        assert_eq!(name, "Invoke");
        assert!(!name.contains("secret"));
    }

    #[test]
    fn test_error_kind_display_matches_wire_spelling() {
        assert_eq!(ErrorKind::ConnectionClosed.to_string(), "connection_closed");
        assert_eq!(ErrorKind::Handler.to_string(), "handler");
        assert_eq!(ErrorKind::Serialization.to_string(), "serialization");
        assert_eq!(ErrorKind::Protocol.to_string(), "protocol");
    }
}
