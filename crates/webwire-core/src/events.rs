//! The event bus: named fire-and-forget notifications with ordered delivery.
//!
//! Each event name holds a list of subscribers in registration order. A
//! publish runs every subscriber for the name, in order, on the publisher's
//! task. A failing subscriber is logged and isolated: later subscribers still
//! run and the publisher never observes the failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

/// Subscriber callback shape. Errors are reported, not propagated.
pub type EventCallback = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    event: String,
    token: u64,
}

impl SubscriptionHandle {
    /// The event name this subscription listens on.
    pub fn event(&self) -> &str {
        &self.event
    }
}

struct Subscriber {
    token: u64,
    callback: EventCallback,
}

/// Ordered subscriber lists keyed by event name.
///
/// Shared via `Arc`; subscriptions outlive any individual transport
/// connection, same as the function registry.
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    tokens: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            tokens: AtomicU64::new(0),
        }
    }

    /// Adds `callback` to the end of the subscriber list for `event`.
    pub fn subscribe(&self, event: &str, callback: EventCallback) -> SubscriptionHandle {
        let token = self.tokens.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("event-bus lock poisoned")
            .entry(event.to_string())
            .or_default()
            .push(Subscriber { token, callback });
        SubscriptionHandle {
            event: event.to_string(),
            token,
        }
    }

    /// Removes the subscription behind `handle`. Returns whether it was
    /// still registered.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut map = self.subscribers.lock().expect("event-bus lock poisoned");
        let Some(list) = map.get_mut(&handle.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.token != handle.token);
        let removed = list.len() < before;
        if list.is_empty() {
            map.remove(&handle.event);
        }
        removed
    }

    /// Delivers `payload` to every subscriber of `event`, in registration
    /// order. Subscriber failures are logged and do not stop delivery.
    pub fn publish_local(&self, event: &str, payload: &Value) {
        let callbacks: Vec<EventCallback> = {
            let map = self.subscribers.lock().expect("event-bus lock poisoned");
            match map.get(event) {
                Some(list) => list.iter().map(|s| Arc::clone(&s.callback)).collect(),
                None => {
                    debug!("event '{event}' has no subscribers");
                    return;
                }
            }
        };

        for callback in callbacks {
            if let Err(message) = callback(payload) {
                warn!("subscriber for '{event}' failed: {message}");
            }
        }
    }

    /// Number of subscribers currently registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .lock()
            .expect("event-bus lock poisoned")
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
