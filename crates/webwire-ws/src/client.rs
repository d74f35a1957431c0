//! Outbound WebSocket connector: the peer role used by native frontends and
//! the integration tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_tungstenite::connect_async;
use tracing::info;
use webwire_core::{duplex_pair, BridgeSession, BridgeSide};

use crate::pump::run_ws_pump;

/// Dials `url`, performs the WebSocket handshake, and attaches a session.
///
/// The pump runs on its own task; the returned session closes itself when
/// the socket goes away.
pub async fn connect(url: &str, side: BridgeSide, frame_capacity: usize) -> Result<Arc<BridgeSession>> {
    let (ws, _response) = connect_async(url)
        .await
        .with_context(|| format!("connecting to {url}"))?;

    let (engine_end, wire_end) = duplex_pair(frame_capacity);
    let session = BridgeSession::attach(side, engine_end);
    info!("session {} connected to {url}", session.id());

    let label = format!("client {url}");
    tokio::spawn(async move {
        run_ws_pump(ws, wire_end, &label).await;
    });

    Ok(session)
}
