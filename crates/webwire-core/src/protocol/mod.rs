//! Wire protocol: envelope types, the JSON frame codec, and call correlation.

pub mod codec;
pub mod correlator;
pub mod envelope;

pub use codec::{decode, encode, to_wire, ProtocolError, SerializationError};
pub use correlator::{CallCorrelator, CallError, CallHandle, IdCounter};
pub use envelope::{CallId, Envelope, ErrorKind};
