//! WebSocket accept loop for browser connections.
//!
//! Each accepted connection gets its own [`BridgeSession`] attached to the
//! shared [`BridgeSide`], so every browser sees the same exposed functions
//! and every emitted event. The new session is handed to the application
//! through `session_tx` so glue code can call into that specific browser.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webwire_core::{duplex_pair, BridgeSession, BridgeSide};

use crate::config::WsConfig;
use crate::pump::run_ws_pump;

/// Binds the configured address and serves until `running` is cleared.
pub async fn run_server(
    config: WsConfig,
    side: BridgeSide,
    session_tx: mpsc::Sender<Arc<BridgeSession>>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding WebSocket listener on {}", config.bind_addr))?;
    info!("listening on {}", listener.local_addr()?);
    serve_listener(listener, config, side, session_tx, running).await
}

/// Serves an already-bound listener until `running` is cleared.
///
/// Each `accept` attempt is bounded by `config.accept_poll` so the shutdown
/// flag is honored promptly. One task per connection; a failed handshake
/// affects only its own connection.
pub async fn serve_listener(
    listener: TcpListener,
    config: WsConfig,
    side: BridgeSide,
    session_tx: mpsc::Sender<Arc<BridgeSession>>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        let accepted = match timeout(config.accept_poll, listener.accept()).await {
            // Poll window elapsed; re-check the flag.
            Err(_) => continue,
            Ok(Err(e)) => {
                warn!("accept failed: {e}");
                continue;
            }
            Ok(Ok(accepted)) => accepted,
        };

        let (stream, peer_addr) = accepted;
        info!("connection from {peer_addr}");

        let side = side.clone();
        let session_tx = session_tx.clone();
        let frame_capacity = config.frame_capacity;
        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("handshake with {peer_addr} failed: {e}");
                    return;
                }
            };

            let (engine_end, wire_end) = duplex_pair(frame_capacity);
            let session = BridgeSession::attach(side, engine_end);
            info!("session {} serves {peer_addr}", session.id());

            if session_tx.send(Arc::clone(&session)).await.is_err() {
                debug!("no application receiver for session {}", session.id());
            }

            run_ws_pump(ws, wire_end, &format!("peer {peer_addr}")).await;
            session.wait_closed().await;
            info!("session {} for {peer_addr} ended", session.id());
        });
    }

    info!("accept loop stopped");
    Ok(())
}
