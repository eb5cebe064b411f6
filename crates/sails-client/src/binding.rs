//! Binding abstraction over the socket connection.
//!
//! Decouples [`SailsClient`](crate::client::SailsClient) from any specific
//! socket library. A binding emits acknowledged events and fans incoming
//! events out to per-subscription listeners; framing, reconnection and
//! transport selection stay inside the library behind it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// Errors that can occur during binding operations.
#[derive(Debug, Error)]
pub enum BindingError {
    /// The connection was closed locally or by the remote peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O or protocol-level error from the socket library.
    #[error("{0}")]
    Io(String),
}

/// Identifies one attached listener so exactly that one can be detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A socket connection that can carry Sails requests and events.
pub trait SocketBinding: Send + Sync + 'static {
    /// Emit `payload` on `event` and deliver the server's ack value on `ack`.
    ///
    /// Resolves once the emission is handed to the connection, not when the
    /// ack arrives. If the ack never comes, `ack` is eventually dropped.
    fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        ack: oneshot::Sender<Value>,
    ) -> impl Future<Output = Result<(), BindingError>> + Send;

    /// Attach a listener for `event`. Every payload received for that event
    /// is sent on `listener` until [`off`](SocketBinding::off) is called.
    fn on(&self, event: &str, listener: mpsc::UnboundedSender<Value>) -> ListenerId;

    /// Detach the listener registered under `id`. Other listeners on the
    /// same event are unaffected.
    fn off(&self, event: &str, id: ListenerId);

    /// Close the connection.
    fn close(&self) -> impl Future<Output = Result<(), BindingError>> + Send;
}

// ---------------------------------------------------------------------------
// Listener registry
// ---------------------------------------------------------------------------

type Listeners = HashMap<String, Vec<(ListenerId, mpsc::UnboundedSender<Value>)>>;

/// Event name → attached listeners. Shared by the binding implementations.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Listeners>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, listener: mpsc::UnboundedSender<Value>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners)
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Returns `false` if no such listener was attached.
    pub fn remove(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let Some(attached) = listeners.get_mut(event) else {
            return false;
        };
        let before = attached.len();
        attached.retain(|(attached_id, _)| *attached_id != id);
        let removed = attached.len() != before;
        if attached.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Send `payload` to every listener on `event`.
    ///
    /// Listeners whose receiving side is gone are pruned. Returns the number
    /// of listeners that received the payload.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let mut listeners = lock(&self.listeners);
        let Some(attached) = listeners.get_mut(event) else {
            trace!(event, "no listeners");
            return 0;
        };
        attached.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
        let delivered = attached.len();
        if attached.is_empty() {
            listeners.remove(event);
        }
        trace!(event, delivered, "dispatched event");
        delivered
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).get(event).map_or(0, Vec::len)
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
