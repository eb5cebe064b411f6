//! Cancellable streams of server-pushed events.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::binding::{ListenerId, SocketBinding};

/// One subscription to a named event.
///
/// The listener is attached when the stream is created and detached when it
/// is dropped or [`unsubscribe`](Self::unsubscribe)d. Each stream owns its
/// own listener, so several streams on the same event all see every payload
/// and can be cancelled independently.
pub struct EventStream<B: SocketBinding> {
    event: String,
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<Value>,
    binding: Arc<B>,
    attached: bool,
}

impl<B: SocketBinding> EventStream<B> {
    pub(crate) fn subscribe(binding: Arc<B>, event: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = binding.on(event, tx);
        trace!(event, ?id, "attached listener");
        Self {
            event: event.to_string(),
            id,
            rx,
            binding,
            attached: true,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Await the next payload. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take a payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    /// Await the next payload and deserialize it.
    pub async fn next_json<T: DeserializeOwned>(&mut self) -> Option<Result<T, serde_json::Error>> {
        self.next().await.map(serde_json::from_value)
    }

    /// Detach the listener. Payloads already buffered can still be read,
    /// after which the stream ends.
    pub fn unsubscribe(&mut self) {
        if self.attached {
            self.binding.off(&self.event, self.id);
            self.attached = false;
            trace!(event = %self.event, id = ?self.id, "detached listener");
        }
    }
}

impl<B: SocketBinding> Stream for EventStream<B> {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

impl<B: SocketBinding> Drop for EventStream<B> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
