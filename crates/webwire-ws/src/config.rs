//! Server configuration.
//!
//! Plain struct, built by the host process. No file format and no CLI
//! surface; embedding applications construct it directly.

use std::net::SocketAddr;
use std::time::Duration;

use webwire_core::DEFAULT_FRAME_CAPACITY;

/// Configuration for the WebSocket accept loop.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Bounded-queue capacity for each session's frame channels.
    pub frame_capacity: usize,
    /// How long one `accept` attempt may block before the shutdown flag is
    /// re-checked.
    pub accept_poll: Duration,
}

impl Default for WsConfig {
    /// Local-development defaults: loopback only, port 8765.
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8765".parse().expect("valid literal address"),
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            accept_poll: Duration::from_millis(200),
        }
    }
}
