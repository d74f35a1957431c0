//! The function registry: the table of names a side exposes to its peer.
//!
//! Handlers are async (`Vec<Value> -> BoxFuture<Result<Value, String>>`);
//! [`FunctionRegistry::expose_fn`] wraps a plain closure so synchronous and
//! async handlers share one entry type. Registration is last-write-wins:
//! exposing a name twice replaces the earlier handler.
//!
//! Invocation failures are normal results, never panics. A name the side
//! never exposed yields [`InvokeError::NameNotFound`]; a handler that returns
//! `Err` yields [`InvokeError::Handler`] with the handler's message preserved.
//! Signal failure through the `Result`: a panic unwinds out of `invoke`, and
//! it is the session layer that converts it into a `Handler` error for the
//! remote caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// The stored handler shape. `Arc` so invocation can run without holding the
/// registry lock across an await.
pub type Handler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Why an invocation failed. Mirrors the wire `ErrorKind` taxonomy so the
/// dispatcher can translate it directly into an `Error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// No handler is exposed under the requested name.
    #[error("no function named '{0}' is exposed")]
    NameNotFound(String),

    /// The handler ran and reported failure; its message is preserved.
    #[error("handler failed: {0}")]
    Handler(String),
}

struct Registration {
    handler: Handler,
    registered_at: Instant,
}

/// Name → handler table for one side of the bridge.
///
/// Shared via `Arc` and safe to mutate while a session is live; registry
/// contents outlive any individual transport connection.
pub struct FunctionRegistry {
    entries: Mutex<HashMap<String, Registration>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Exposes an async handler under `name`, replacing any earlier handler
    /// with that name.
    pub fn expose(&self, name: &str, handler: Handler) {
        let entry = Registration {
            handler,
            registered_at: Instant::now(),
        };
        let replaced = self
            .entries
            .lock()
            .expect("registry lock poisoned")
            .insert(name.to_string(), entry);
        if let Some(old) = replaced {
            debug!(
                "replaced handler '{name}' (previous registered {:?} ago)",
                old.registered_at.elapsed()
            );
        }
    }

    /// Exposes a synchronous closure under `name`.
    pub fn expose_fn<F>(&self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.expose(
            name,
            Arc::new(move |args| {
                let f = Arc::clone(&f);
                Box::pin(async move { f(args) })
            }),
        );
    }

    /// Removes the handler exposed under `name`. Returns whether one existed.
    pub fn unexpose(&self, name: &str) -> bool {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Runs the handler exposed under `name` with `args`.
    ///
    /// The handler future is awaited after the lock is released, so a slow
    /// handler never blocks other registry operations.
    ///
    /// # Errors
    ///
    /// [`InvokeError::NameNotFound`] if no handler is exposed under `name`,
    /// [`InvokeError::Handler`] if the handler reports failure.
    pub async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
        let handler = {
            let entries = self.entries.lock().expect("registry lock poisoned");
            match entries.get(name) {
                Some(entry) => Arc::clone(&entry.handler),
                None => return Err(InvokeError::NameNotFound(name.to_string())),
            }
        };

        handler(args).await.map_err(InvokeError::Handler)
    }

    /// Sorted snapshot of the currently exposed names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .lock()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
