//! # webwire-core
//!
//! Transport-agnostic RPC and event bridge between two peers over an
//! ordered, reliable duplex channel of text frames. Either side can expose
//! named functions, call the functions the other side exposed, and publish
//! fire-and-forget events; calls are correlated by id and resolve exactly
//! once.
//!
//! The engine never opens a socket. A transport binding (see `webwire-ws`)
//! or a test hands [`BridgeSession::attach`] a [`FrameChannel`]; everything
//! above that seam is channel-agnostic.
//!
//! ```no_run
//! use serde_json::json;
//! use webwire_core::{duplex_pair, BridgeSession, BridgeSide, DEFAULT_FRAME_CAPACITY};
//!
//! # async fn demo() -> Result<(), webwire_core::CallError> {
//! let (backend_chan, frontend_chan) = duplex_pair(DEFAULT_FRAME_CAPACITY);
//!
//! let backend = BridgeSession::attach(BridgeSide::new(), backend_chan);
//! let frontend = BridgeSession::attach(BridgeSide::new(), frontend_chan);
//!
//! backend.expose_fn("add", |args| {
//!     let a = args[0].as_i64().ok_or("not an integer")?;
//!     let b = args[1].as_i64().ok_or("not an integer")?;
//!     Ok(json!(a + b))
//! });
//!
//! let sum = frontend.call("add", vec![json!(2), json!(3)]).await?;
//! assert_eq!(sum, json!(5));
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use events::{EventBus, EventCallback, SubscriptionHandle};
pub use protocol::{
    CallCorrelator, CallError, CallHandle, CallId, Envelope, ErrorKind, ProtocolError,
    SerializationError,
};
pub use registry::{FunctionRegistry, Handler, InvokeError};
pub use session::{BridgeSession, BridgeSide, SessionState};
pub use transport::{duplex_pair, FrameChannel, DEFAULT_FRAME_CAPACITY};
