//! The frame transport seam: an ordered, reliable duplex channel of text
//! frames that a session owns exclusively.
//!
//! The engine never touches sockets. A transport binding (or a test) hands
//! the session a [`FrameChannel`]; whatever sits on the other end of the two
//! mpsc channels is the wire. [`duplex_pair`] cross-connects two channels for
//! the in-memory transport the test suites run on.

use tokio::sync::mpsc;

/// Default bounded-queue capacity for a frame channel.
pub const DEFAULT_FRAME_CAPACITY: usize = 128;

/// One end of an ordered duplex text-frame channel.
///
/// `tx` carries frames toward the peer, `rx` delivers frames from the peer.
/// Both queues are bounded, so a slow peer exerts backpressure on senders.
pub struct FrameChannel {
    pub tx: mpsc::Sender<String>,
    pub rx: mpsc::Receiver<String>,
}

/// Creates two cross-connected [`FrameChannel`]s.
///
/// A frame sent on one end's `tx` arrives on the other end's `rx`, in order.
/// Dropping either end closes the corresponding direction, which the session
/// observes as channel loss.
pub fn duplex_pair(capacity: usize) -> (FrameChannel, FrameChannel) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        FrameChannel { tx: a_tx, rx: a_rx },
        FrameChannel { tx: b_tx, rx: b_rx },
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
