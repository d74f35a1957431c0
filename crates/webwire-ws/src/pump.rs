//! The frame pump: shuttles text frames between a WebSocket and the engine's
//! frame channel, unchanged in both directions.
//!
//! The protocol is JSON text end to end, so binary frames are logged and
//! ignored. Ping/pong is left to tokio-tungstenite's automatic handling.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use webwire_core::FrameChannel;

/// Runs the pump until either the socket or the engine side goes away.
///
/// When the engine drops its channel end (session closed), a WebSocket Close
/// is sent before the pump returns. When the socket ends first, dropping the
/// channel is what tells the session the transport is gone.
pub async fn run_ws_pump<S>(mut ws: WebSocketStream<S>, channel: FrameChannel, label: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let FrameChannel { tx, mut rx } = channel;

    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(frame))) => {
                    if tx.send(frame).await.is_err() {
                        debug!("{label}: engine side gone, dropping socket");
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    warn!("{label}: ignoring {}-byte binary frame", bytes.len());
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("{label}: peer closed the socket");
                    break;
                }
                // Ping/Pong/Frame are handled inside tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{label}: socket error: {e}");
                    break;
                }
                None => {
                    debug!("{label}: socket ended");
                    break;
                }
            },
            outgoing = rx.recv() => match outgoing {
                Some(frame) => {
                    if let Err(e) = ws.send(Message::Text(frame)).await {
                        warn!("{label}: send failed: {e}");
                        break;
                    }
                }
                None => {
                    debug!("{label}: session closed, closing socket");
                    let _ = ws.close(None).await;
                    break;
                }
            },
        }
    }
}
