//! # webwire-ws
//!
//! WebSocket transport binding for the WebWire bridge engine. Frames are
//! JSON text end to end; this crate only moves them between a socket and a
//! `webwire-core` session.
//!
//! - [`server::run_server`] accepts browser connections and attaches one
//!   session per connection to a shared [`webwire_core::BridgeSide`].
//! - [`client::connect`] is the outbound peer role.
//! - [`pump::run_ws_pump`] is the shared frame shuttle underneath both.
//!
//! Browser launching, static file serving, and authentication are the host
//! application's concern.

pub mod client;
pub mod config;
pub mod pump;
pub mod server;

pub use client::connect;
pub use config::WsConfig;
pub use server::{run_server, serve_listener};
