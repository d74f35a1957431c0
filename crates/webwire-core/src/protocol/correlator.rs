//! Call correlation: unique request ids and the in-flight pending-call table.
//!
//! The correlator is the caller-side half of the request/reply protocol. When
//! a call is issued it records a pending entry keyed by a fresh id; when the
//! matching `Result`/`Error` envelope arrives, the entry is removed and its
//! single-use resolver fires. Removal-before-resolve is what makes completion
//! exactly-once regardless of arrival order or duplicate delivery.
//!
//! One correlator belongs to exactly one session. A reconnecting side keeps
//! its registries but gets a fresh correlator; every call bound to the old
//! channel is failed with [`CallError::ConnectionClosed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::protocol::codec::SerializationError;
use crate::protocol::envelope::{CallId, ErrorKind};

// ── Id allocation ─────────────────────────────────────────────────────────────

/// A thread-safe, monotonically increasing counter for correlation ids.
///
/// Ids start at 0 and increment by 1 with each call to [`next`](Self::next),
/// so no id is reused within a session's lifetime. `Ordering::Relaxed` is
/// sufficient: ids only need uniqueness, not memory synchronisation.
pub struct IdCounter {
    inner: AtomicU64,
}

impl IdCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next id and atomically advances the counter.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the current value without advancing. For diagnostics only.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Call failure type ─────────────────────────────────────────────────────────

/// Why a `call` did not produce a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The remote side replied with an `Error` envelope.
    #[error("remote call failed ({kind}): {message}")]
    Remote {
        /// Failure category, preserved across the process boundary.
        kind: ErrorKind,
        /// The remote side's message.
        message: String,
    },

    /// The session closed before a matching reply arrived.
    #[error("session closed before a reply arrived")]
    ConnectionClosed,

    /// An argument or payload fell outside the wire domain; nothing was sent.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

// ── Pending-call table ────────────────────────────────────────────────────────

/// A call that has been sent but not yet answered.
struct PendingCall {
    /// Name of the remote function this call targets. Used in logs.
    target: String,
    /// When the call was issued.
    sent_at: Instant,
    /// Single-use completion slot.
    resolver: oneshot::Sender<Result<Value, CallError>>,
}

/// Awaitable handle returned by [`CallCorrelator::begin`].
///
/// Resolves exactly once: either with the remote value, a remote failure, or
/// [`CallError::ConnectionClosed`] when the session terminates first.
pub struct CallHandle {
    rx: oneshot::Receiver<Result<Value, CallError>>,
}

impl CallHandle {
    /// Suspends until the call completes.
    pub async fn wait(self) -> Result<Value, CallError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // Resolver dropped without firing: the correlator is gone, which
            // only happens when the session itself is torn down.
            Err(_) => Err(CallError::ConnectionClosed),
        }
    }
}

/// The table behind the correlator lock. `closed` is terminal: it is set by
/// `fail_all` under the same lock that guards insertion, so no entry can
/// slip in after the drain.
struct PendingTable {
    entries: HashMap<CallId, PendingCall>,
    closed: bool,
}

/// Issues unique ids, tracks in-flight calls, and completes each exactly once.
pub struct CallCorrelator {
    ids: IdCounter,
    pending: Mutex<PendingTable>,
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self {
            ids: IdCounter::new(),
            pending: Mutex::new(PendingTable {
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Allocates a fresh id, records the pending call, and returns the handle
    /// the caller awaits.
    ///
    /// On a correlator that has already been closed by `fail_all`, nothing
    /// is recorded and the handle resolves [`CallError::ConnectionClosed`]
    /// immediately.
    ///
    /// The caller is responsible for actually sending the `Invoke` envelope;
    /// if the send fails it must `abort` the id so no entry lingers.
    pub fn begin(&self, target: &str) -> (CallId, CallHandle) {
        let id = self.ids.next();
        let (resolver, rx) = oneshot::channel();
        let mut table = self.pending.lock().expect("pending-call lock poisoned");
        if table.closed {
            // The dropped resolver closes the handle.
            debug!("call {id} to '{target}' rejected, correlator closed");
        } else {
            table.entries.insert(
                id,
                PendingCall {
                    target: target.to_string(),
                    sent_at: Instant::now(),
                    resolver,
                },
            );
        }
        (id, CallHandle { rx })
    }

    /// Completes the pending call `id` with `value`.
    ///
    /// Returns `false` (after logging) when `id` has no pending entry, which
    /// guards against duplicate or spurious replies.
    pub fn complete(&self, id: CallId, value: Value) -> bool {
        match self.take(id) {
            Some(entry) => {
                // The caller may have dropped its handle; that is not an error.
                let _ = entry.resolver.send(Ok(value));
                true
            }
            None => {
                warn!("reply for unknown call id {id} ignored");
                false
            }
        }
    }

    /// Fails the pending call `id` with a categorized error.
    ///
    /// Returns `false` (after logging) when `id` has no pending entry.
    pub fn fail(&self, id: CallId, kind: ErrorKind, message: String) -> bool {
        match self.take(id) {
            Some(entry) => {
                let _ = entry.resolver.send(Err(CallError::Remote { kind, message }));
                true
            }
            None => {
                warn!("error reply for unknown call id {id} ignored");
                false
            }
        }
    }

    /// Discards the pending entry for `id` without resolving it.
    ///
    /// Used when the `Invoke` envelope could never be handed to the
    /// transport; the caller reports the failure itself and the dropped
    /// resolver keeps the handle's exactly-once contract.
    pub fn abort(&self, id: CallId) {
        if self.take(id).is_none() {
            warn!("abort for unknown call id {id} ignored");
        }
    }

    /// Fails every remaining pending call with [`CallError::ConnectionClosed`]
    /// and closes the correlator for good.
    ///
    /// Called at session termination; afterwards no handle remains
    /// incomplete, including handles from a `begin` that races past the
    /// session's own state check.
    pub fn fail_all(&self) {
        let drained: Vec<(CallId, PendingCall)> = {
            let mut table = self.pending.lock().expect("pending-call lock poisoned");
            table.closed = true;
            table.entries.drain().collect()
        };

        for (id, entry) in drained {
            debug!(
                "failing call {id} to '{}' (pending for {:?}) at session close",
                entry.target,
                entry.sent_at.elapsed()
            );
            let _ = entry.resolver.send(Err(CallError::ConnectionClosed));
        }
    }

    /// Number of calls currently awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .expect("pending-call lock poisoned")
            .entries
            .len()
    }

    fn take(&self, id: CallId) -> Option<PendingCall> {
        self.pending
            .lock()
            .expect("pending-call lock poisoned")
            .entries
            .remove(&id)
    }
}

impl Default for CallCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
