//! The bridge session: one live duplex channel wired to a side's registry,
//! event bus, and a fresh call correlator.
//!
//! [`BridgeSession::attach`] takes exclusive ownership of a [`FrameChannel`]
//! and spawns two pumps:
//!
//! - the **outbound pump** drains a single bounded queue, encodes each
//!   envelope, and writes it to the channel. One queue per session is what
//!   preserves per-channel FIFO across calls, replies, and events.
//! - the **inbound pump** decodes each received frame and dispatches it:
//!   `Invoke` spawns a registry invocation (invocations run concurrently and
//!   each replies when it completes), `Result`/`Error` resolve the
//!   correlator, `Event` fans out on the event bus. An undecodable frame is
//!   logged and skipped.
//!
//! A session is bound to one channel for its whole life. When the peer
//! reconnects, the application attaches a new session to the same
//! [`BridgeSide`]: exposed functions and subscriptions carry over, pending
//! calls do not.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventBus, EventCallback, SubscriptionHandle};
use crate::protocol::codec;
use crate::protocol::correlator::{CallCorrelator, CallError};
use crate::protocol::envelope::{CallId, Envelope, ErrorKind};
use crate::registry::{FunctionRegistry, Handler, InvokeError};
use crate::transport::{FrameChannel, DEFAULT_FRAME_CAPACITY};

// ── Session state ─────────────────────────────────────────────────────────────

/// Lifecycle of a session. Transitions are forward-only; any non-Closed
/// state may jump directly to `Closed` on channel loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// The channel is being attached; no traffic yet.
    Connecting,
    /// Normal bidirectional operation.
    Open,
    /// A graceful close is draining the outbound queue.
    Closing,
    /// Terminal. All pending calls have been failed.
    Closed,
}

// ── Per-side resources ────────────────────────────────────────────────────────

/// The resources one side of the bridge owns independently of any channel.
///
/// Cloneable and cheap to share. Attach a new session to the same side after
/// a reconnect and every exposed function and event subscription is still
/// there; only the in-flight calls of the dead session are lost.
#[derive(Clone, Default)]
pub struct BridgeSide {
    pub registry: Arc<FunctionRegistry>,
    pub events: Arc<EventBus>,
}

impl BridgeSide {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Session internals ─────────────────────────────────────────────────────────

/// What travels through the outbound queue. `Shutdown` is enqueued behind
/// all previously queued envelopes, so a graceful close drains before the
/// channel is released.
enum Outgoing {
    Envelope(Envelope),
    Shutdown,
}

/// State shared between the session handle and its pumps.
///
/// Deliberately excludes the outbound sender: when the last session handle
/// and the inbound pump are gone, the queue closes and the outbound pump
/// winds the session down.
struct Shared {
    id: Uuid,
    side: BridgeSide,
    correlator: CallCorrelator,
    state_tx: watch::Sender<SessionState>,
}

impl Shared {
    /// Advances the state if `to` is strictly later. Returns whether the
    /// state changed.
    fn transition(&self, to: SessionState) -> bool {
        self.state_tx.send_if_modified(|state| {
            if to > *state {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Moves to `Closed` from any state and fails all pending calls.
    /// Idempotent.
    fn force_close(&self) {
        if self.transition(SessionState::Closed) {
            info!("session {}: closed", self.id);
            self.correlator.fail_all();
        }
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }
}

// ── Public session handle ─────────────────────────────────────────────────────

/// One side's handle to a live bridge channel.
pub struct BridgeSession {
    shared: Arc<Shared>,
    out_tx: mpsc::Sender<Outgoing>,
}

impl BridgeSession {
    /// Binds `side` to `channel` and starts the session pumps.
    ///
    /// The returned session is already `Open`: `attach` receives an
    /// established channel, so `Connecting` exists only as the initial watch
    /// value.
    pub fn attach(side: BridgeSide, channel: FrameChannel) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            side,
            correlator: CallCorrelator::new(),
            state_tx,
        });
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_FRAME_CAPACITY);

        shared.transition(SessionState::Open);
        info!("session {}: open", shared.id);

        tokio::spawn(run_outbound_pump(Arc::clone(&shared), out_rx, channel.tx));
        tokio::spawn(run_inbound_pump(
            Arc::clone(&shared),
            channel.rx,
            out_tx.clone(),
        ));

        Arc::new(Self { shared, out_tx })
    }

    /// Per-session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The side this session is attached to.
    pub fn side(&self) -> &BridgeSide {
        &self.shared.side
    }

    /// Exposes an async handler to the peer. Last registration wins.
    ///
    /// A handler that panics aborts only its own invocation task; the
    /// caller receives a `Handler` error. Ordinary failures should still be
    /// reported through the `Result`, which preserves the message.
    pub fn expose(&self, name: &str, handler: Handler) {
        self.shared.side.registry.expose(name, handler);
    }

    /// Exposes a synchronous closure to the peer.
    pub fn expose_fn<F>(&self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.shared.side.registry.expose_fn(name, f);
    }

    /// Subscribes to events the peer (or this side, via `emit`) publishes
    /// under `name`.
    ///
    /// Callbacks for inbound events run inline on the session's dispatch
    /// task. That is what keeps events ordered relative to each other and to
    /// surrounding frames, and it means a slow callback delays everything
    /// behind it; hand long-running work to its own task.
    pub fn on_event(&self, name: &str, callback: EventCallback) -> SubscriptionHandle {
        self.shared.side.events.subscribe(name, callback)
    }

    /// Invokes the function the peer exposed under `name` and suspends until
    /// the reply arrives. The only suspending operation in the public API;
    /// no timeout is imposed, callers wrap in `tokio::time::timeout` if they
    /// need one.
    ///
    /// # Errors
    ///
    /// [`CallError::Serialization`] when an argument is outside the wire
    /// domain (nothing is sent), [`CallError::Remote`] when the peer replies
    /// with an error, [`CallError::ConnectionClosed`] when the session ends
    /// before the reply.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, CallError> {
        if self.state() != SessionState::Open {
            return Err(CallError::ConnectionClosed);
        }
        for (i, arg) in args.iter().enumerate() {
            codec::check_value(arg, &format!("args[{i}]"))?;
        }

        let (id, handle) = self.shared.correlator.begin(name);
        let envelope = Envelope::Invoke {
            id,
            name: name.to_string(),
            args,
        };
        if self.out_tx.send(Outgoing::Envelope(envelope)).await.is_err() {
            self.shared.correlator.abort(id);
            return Err(CallError::ConnectionClosed);
        }

        handle.wait().await
    }

    /// Publishes an event symmetrically: local subscribers run and the peer
    /// receives an `Event` envelope. Fire-and-forget; no delivery
    /// confirmation exists.
    ///
    /// # Errors
    ///
    /// [`CallError::Serialization`] when the payload is outside the wire
    /// domain (nothing is delivered), [`CallError::ConnectionClosed`] when
    /// the session is no longer open.
    pub async fn emit(&self, name: &str, payload: Value) -> Result<(), CallError> {
        if self.state() != SessionState::Open {
            return Err(CallError::ConnectionClosed);
        }
        codec::check_value(&payload, "payload")?;

        self.shared.side.events.publish_local(name, &payload);

        let envelope = Envelope::Event {
            name: name.to_string(),
            payload,
        };
        self.out_tx
            .send(Outgoing::Envelope(envelope))
            .await
            .map_err(|_| CallError::ConnectionClosed)
    }

    /// Gracefully closes the session: queued envelopes drain, then the state
    /// reaches `Closed` and every pending call fails with
    /// [`CallError::ConnectionClosed`]. Idempotent.
    pub async fn close(&self) {
        if !self.shared.transition(SessionState::Closing) {
            return;
        }
        debug!("session {}: closing", self.shared.id);
        if self.out_tx.send(Outgoing::Shutdown).await.is_err() {
            // Outbound pump already gone; nothing left to drain.
            self.shared.force_close();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// A watch receiver that observes every state change. This is the
    /// session-level failure notification: application glue watches for
    /// `Closed` to trigger reconnect or teardown.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Suspends until the session reaches `Closed`.
    pub async fn wait_closed(&self) {
        let mut state_rx = self.shared.state_tx.subscribe();
        let _ = state_rx
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }
}

// ── Pumps ─────────────────────────────────────────────────────────────────────

/// Drains the outbound queue into the frame channel.
///
/// Ends on `Shutdown` (graceful drain complete), on channel loss, or when
/// every queue sender is gone; all three wind the session down.
async fn run_outbound_pump(
    shared: Arc<Shared>,
    mut out_rx: mpsc::Receiver<Outgoing>,
    frame_tx: mpsc::Sender<String>,
) {
    while let Some(item) = out_rx.recv().await {
        match item {
            Outgoing::Envelope(envelope) => match codec::encode(&envelope) {
                Ok(frame) => {
                    if frame_tx.send(frame).await.is_err() {
                        warn!("session {}: channel lost while sending", shared.id);
                        break;
                    }
                }
                // Recoverable per message; later envelopes still go out.
                Err(e) => warn!(
                    "session {}: dropped outbound {} frame: {e}",
                    shared.id,
                    envelope.type_name()
                ),
            },
            Outgoing::Shutdown => break,
        }
    }
    shared.force_close();
}

/// Decodes and dispatches received frames until the channel ends or the
/// session closes.
async fn run_inbound_pump(
    shared: Arc<Shared>,
    mut frame_rx: mpsc::Receiver<String>,
    out_tx: mpsc::Sender<Outgoing>,
) {
    let mut state_rx = shared.state_tx.subscribe();
    loop {
        tokio::select! {
            frame = frame_rx.recv() => match frame {
                Some(frame) => dispatch_frame(&shared, &out_tx, &frame),
                None => {
                    debug!("session {}: channel ended", shared.id);
                    shared.force_close();
                    break;
                }
            },
            _ = state_rx.wait_for(|state| *state == SessionState::Closed) => break,
        }
    }
}

fn dispatch_frame(shared: &Arc<Shared>, out_tx: &mpsc::Sender<Outgoing>, frame: &str) {
    let envelope = match codec::decode(frame) {
        Ok(envelope) => envelope,
        // Recoverable per message; the session keeps running.
        Err(e) => {
            warn!("session {}: discarded inbound frame: {e}", shared.id);
            return;
        }
    };

    match envelope {
        Envelope::Invoke { id, name, args } => {
            spawn_invocation(Arc::clone(shared), out_tx.clone(), id, name, args);
        }
        Envelope::Result { id, value } => {
            shared.correlator.complete(id, value);
        }
        Envelope::Error {
            id,
            error_kind,
            message,
        } => {
            shared.correlator.fail(id, error_kind, message);
        }
        Envelope::Event { name, payload } => {
            // Delivered inline so events keep their arrival order; the cost
            // is that subscribers share the dispatch task (see `on_event`).
            shared.side.events.publish_local(&name, &payload);
        }
    }
}

/// Runs one registry invocation on its own task and enqueues the reply when
/// it completes. Concurrent invocations interleave freely; replies join the
/// outbound queue in completion order.
///
/// The handler itself runs on a second task underneath, so a panicking
/// handler still produces an `Error` reply instead of leaving the remote
/// caller pending.
fn spawn_invocation(
    shared: Arc<Shared>,
    out_tx: mpsc::Sender<Outgoing>,
    id: CallId,
    name: String,
    args: Vec<Value>,
) {
    tokio::spawn(async move {
        let registry = Arc::clone(&shared.side.registry);
        let handler_name = name.clone();
        let invocation = tokio::spawn(async move { registry.invoke(&handler_name, args).await });

        let reply = match invocation.await {
            Ok(Ok(value)) => match codec::check_value(&value, "value") {
                Ok(()) => Envelope::Result { id, value },
                Err(e) => Envelope::Error {
                    id,
                    error_kind: ErrorKind::Serialization,
                    message: e.to_string(),
                },
            },
            Ok(Err(e @ InvokeError::NameNotFound(_))) => Envelope::Error {
                id,
                error_kind: ErrorKind::NameNotFound,
                message: e.to_string(),
            },
            Ok(Err(InvokeError::Handler(message))) => Envelope::Error {
                id,
                error_kind: ErrorKind::Handler,
                message,
            },
            Err(join_error) => {
                warn!(
                    "session {}: handler '{name}' panicked: {join_error}",
                    shared.id
                );
                Envelope::Error {
                    id,
                    error_kind: ErrorKind::Handler,
                    message: "handler panicked".to_string(),
                }
            }
        };

        if out_tx.send(Outgoing::Envelope(reply)).await.is_err() {
            debug!(
                "session {}: reply for call {id} dropped, session closed",
                shared.id
            );
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
