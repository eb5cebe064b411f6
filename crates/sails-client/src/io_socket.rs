//! socket.io binding for native targets.
//!
//! Uses `rust_socketio`'s async client for the connection itself (handshake,
//! framing, heartbeats). Incoming events are routed through a catch-all
//! handler into a [`ListenerRegistry`], so listeners can come and go after
//! the connection is up.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload, TransportType};
use sails_core::config::{ResolvedConfig, TransportKind};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::binding::{BindingError, ListenerId, ListenerRegistry, SocketBinding};
use crate::error::SailsError;

/// How long an ack is awaited when the config sets no request timeout.
///
/// The library discards acks that arrive after this window.
pub const DEFAULT_ACK_WINDOW: Duration = Duration::from_secs(60 * 60);

/// A live socket.io connection to a Sails server.
pub struct IoSocket {
    client: Client,
    listeners: Arc<ListenerRegistry>,
    ack_window: Duration,
}

impl IoSocket {
    /// Open the connection described by `config`.
    pub async fn connect(config: &ResolvedConfig) -> Result<Self, SailsError> {
        let url = config.connect_url()?;
        let listeners = Arc::new(ListenerRegistry::new());

        let registry = Arc::clone(&listeners);
        let mut builder = ClientBuilder::new(url.as_str())
            .namespace(config.namespace())
            .transport_type(transport_type(config.transports()))
            .on_any(move |event: Event, payload: Payload, _client: Client| {
                route_event(&registry, event, payload)
            });
        for (name, value) in &config.options().extra_headers {
            builder = builder.opening_header(name.as_str(), value.clone());
        }

        let client = builder
            .connect()
            .await
            .map_err(|e| SailsError::Connect(e.to_string()))?;
        debug!(uri = config.uri(), namespace = config.namespace(), "socket connected");

        Ok(Self {
            client,
            listeners,
            ack_window: config.request_timeout().unwrap_or(DEFAULT_ACK_WINDOW),
        })
    }
}

impl SocketBinding for IoSocket {
    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        ack: oneshot::Sender<Value>,
    ) -> Result<(), BindingError> {
        let mut ack = Some(ack);
        let callback = move |payload: Payload, _client: Client| -> BoxFuture<'static, ()> {
            if let Some(ack) = ack.take() {
                match first_value(payload) {
                    Some(value) => {
                        if ack.send(value).is_err() {
                            trace!("ack arrived after the requester stopped waiting");
                        }
                    }
                    None => warn!("ack carried no JSON payload"),
                }
            }
            async {}.boxed()
        };

        self.client
            .emit_with_ack(event, Payload::Text(vec![payload]), self.ack_window, callback)
            .await
            .map_err(|e| BindingError::Io(e.to_string()))
    }

    fn on(&self, event: &str, listener: mpsc::UnboundedSender<Value>) -> ListenerId {
        self.listeners.add(event, listener)
    }

    fn off(&self, event: &str, id: ListenerId) {
        self.listeners.remove(event, id);
    }

    async fn close(&self) -> Result<(), BindingError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BindingError::Io(e.to_string()))
    }
}

fn transport_type(kinds: &[TransportKind]) -> TransportType {
    match kinds {
        [TransportKind::Websocket] => TransportType::Websocket,
        [TransportKind::Polling] => TransportType::Polling,
        _ => TransportType::Any,
    }
}

fn route_event(registry: &ListenerRegistry, event: Event, payload: Payload) -> BoxFuture<'static, ()> {
    let name = match event {
        Event::Custom(name) => name,
        Event::Message => "message".to_string(),
        other => {
            trace!(?other, "ignoring reserved event");
            return async {}.boxed();
        }
    };

    match first_value(payload) {
        Some(value) => {
            registry.dispatch(&name, &value);
        }
        None => warn!(event = %name, "dropping event without a JSON payload"),
    }
    async {}.boxed()
}

/// Sails sends a single argument per event and per ack.
fn first_value(payload: Payload) -> Option<Value> {
    match payload {
        Payload::Text(values) => Some(values.into_iter().next().unwrap_or(Value::Null)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_transport_kinds_are_forced() {
        assert!(matches!(
            transport_type(&[TransportKind::Websocket]),
            TransportType::Websocket
        ));
        assert!(matches!(
            transport_type(&[TransportKind::Polling]),
            TransportType::Polling
        ));
    }

    #[test]
    fn mixed_or_missing_transports_allow_any() {
        assert!(matches!(
            transport_type(&[TransportKind::Polling, TransportKind::Websocket]),
            TransportType::Any
        ));
        assert!(matches!(transport_type(&[]), TransportType::Any));
    }

    #[tokio::test]
    async fn custom_events_reach_their_listeners() {
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        registry.add("user", tx);
        registry.add("order", other_tx);

        route_event(
            &registry,
            Event::Custom("user".into()),
            Payload::Text(vec![json!({ "id": 1 }), json!("ignored")]),
        )
        .await;

        assert_eq!(rx.try_recv().unwrap(), json!({ "id": 1 }));
        assert!(rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn plain_messages_route_as_message() {
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add("message", tx);

        route_event(&registry, Event::Message, Payload::Text(vec![json!("hi")])).await;

        assert_eq!(rx.try_recv().unwrap(), json!("hi"));
    }

    #[tokio::test]
    async fn reserved_events_and_binary_payloads_are_dropped() {
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add("connect", tx.clone());
        registry.add("blob", tx);

        route_event(&registry, Event::Connect, Payload::Text(vec![json!(1)])).await;
        route_event(&registry, Event::Custom("blob".into()), Payload::from(vec![1u8, 2])).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(registry.listener_count("blob"), 1);
    }

    #[test]
    fn first_value_takes_the_leading_argument() {
        assert_eq!(
            first_value(Payload::Text(vec![json!(1), json!(2)])),
            Some(json!(1))
        );
        assert_eq!(first_value(Payload::Text(Vec::new())), Some(Value::Null));
        assert_eq!(first_value(Payload::from(vec![0u8])), None);
    }
}
