//! In-process [`SocketBinding`] with no network behind it.
//!
//! Records every emission, holds acks until the test answers them (or
//! answers immediately through a responder), and lets the test push server
//! events to attached listeners.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::binding::{BindingError, ListenerId, ListenerRegistry, SocketBinding, lock};

type Responder = Box<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// One recorded `emit_with_ack` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub event: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct MemorySocket {
    listeners: ListenerRegistry,
    emitted: Mutex<Vec<Emission>>,
    pending: Mutex<VecDeque<oneshot::Sender<Value>>>,
    responder: Option<Responder>,
    closed: AtomicBool,
}

impl MemorySocket {
    /// A socket that holds every ack until [`reply`](Self::reply) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A socket that asks `responder` for each ack value as the request is
    /// emitted. A `None` answer leaves the ack pending.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    pub fn emitted(&self) -> Vec<Emission> {
        lock(&self.emitted).clone()
    }

    pub fn pending_acks(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Answer the oldest pending ack.
    ///
    /// Returns `false` if nothing was pending or the requester had already
    /// stopped waiting.
    pub fn reply(&self, response: Value) -> bool {
        let Some(ack) = lock(&self.pending).pop_front() else {
            return false;
        };
        ack.send(response).is_ok()
    }

    /// Deliver a server-pushed event. Returns how many listeners got it.
    pub fn push(&self, event: &str, payload: Value) -> usize {
        self.listeners.dispatch(event, &payload)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.listener_count(event)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl SocketBinding for MemorySocket {
    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        ack: oneshot::Sender<Value>,
    ) -> Result<(), BindingError> {
        if self.is_closed() {
            return Err(BindingError::ConnectionClosed);
        }

        let answer = self
            .responder
            .as_ref()
            .and_then(|responder| responder(event, &payload));

        lock(&self.emitted).push(Emission {
            event: event.to_string(),
            payload,
        });

        match answer {
            Some(response) => {
                let _ = ack.send(response);
            }
            None => lock(&self.pending).push_back(ack),
        }
        Ok(())
    }

    fn on(&self, event: &str, listener: mpsc::UnboundedSender<Value>) -> ListenerId {
        self.listeners.add(event, listener)
    }

    fn off(&self, event: &str, id: ListenerId) {
        self.listeners.remove(event, id);
    }

    async fn close(&self) -> Result<(), BindingError> {
        self.closed.store(true, Ordering::Release);
        lock(&self.pending).clear();
        Ok(())
    }
}
