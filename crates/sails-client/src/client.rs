//! Request adapter for Sails' socket request emulation.
//!
//! [`SailsClient`] turns verb-shaped calls into acknowledged socket.io
//! emissions and exposes server-pushed events as [`EventStream`]s. One
//! binding is shared by every request and subscription.
//!
//! Request futures are lazy: nothing is emitted until the future is first
//! polled. Dropping a future before the response arrives only stops waiting
//! for it; the emission is not recalled and the connection stays usable.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use sails_core::config::ResolvedConfig;
use sails_core::protocol::{
    RequestDescriptor, RequestMethod, RequestOptions, SailsRequest, SailsResponse,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::binding::SocketBinding;
use crate::error::SailsError;
use crate::events::EventStream;

/// Future returned by every request method.
pub type ResponseFuture = BoxFuture<'static, Result<SailsResponse, SailsError>>;

/// A Sails client over any [`SocketBinding`].
///
/// Construct with [`SailsClient::with_binding`] (generic), or use the
/// convenience method [`connect`](SailsClient::connect) (socket.io).
pub struct SailsClient<B: SocketBinding> {
    binding: Arc<B>,
    config: ResolvedConfig,
}

impl<B: SocketBinding> Clone for SailsClient<B> {
    fn clone(&self) -> Self {
        Self {
            binding: Arc::clone(&self.binding),
            config: self.config.clone(),
        }
    }
}

#[cfg(feature = "native")]
impl SailsClient<crate::io_socket::IoSocket> {
    /// Connect to the Sails server described by `config`.
    ///
    /// Resolve the config first with
    /// [`ClientConfig::resolve`](sails_core::config::ClientConfig::resolve);
    /// that step is where a missing URI is reported.
    pub async fn connect(config: ResolvedConfig) -> Result<Self, SailsError> {
        let socket = crate::io_socket::IoSocket::connect(&config).await?;
        Ok(Self::with_binding(config, socket))
    }
}

impl<B: SocketBinding> SailsClient<B> {
    /// Create a client over an already-built binding.
    pub fn with_binding(config: ResolvedConfig, binding: B) -> Self {
        Self::from_shared(config, Arc::new(binding))
    }

    /// Like [`with_binding`](Self::with_binding), for a binding the caller
    /// keeps a handle to.
    pub fn from_shared(config: ResolvedConfig, binding: Arc<B>) -> Self {
        Self { binding, config }
    }

    /// The effective configuration resolved at construction.
    pub fn configuration(&self) -> &ResolvedConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Verbs
    // ------------------------------------------------------------------

    pub fn get(&self, url: &str, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Get, url, None, options)
    }

    pub fn post(&self, url: &str, body: Value, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Post, url, Some(body), options)
    }

    pub fn put(&self, url: &str, body: Value, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Put, url, Some(body), options)
    }

    pub fn delete(&self, url: &str, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Delete, url, None, options)
    }

    pub fn options(&self, url: &str, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Options, url, None, options)
    }

    pub fn head(&self, url: &str, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Head, url, None, options)
    }

    pub fn patch(&self, url: &str, body: Value, options: RequestOptions) -> ResponseFuture {
        self.request(RequestMethod::Patch, url, Some(body), options)
    }

    /// Send a request with any verb.
    ///
    /// Default headers from the configuration are merged under the per-call
    /// ones, empty fields are dropped, and the result is emitted on the verb's
    /// event once the returned future is polled. A `body` is ignored for
    /// verbs that do not carry one.
    pub fn request(
        &self,
        method: RequestMethod,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ResponseFuture {
        let envelope = RequestDescriptor::new(url, method, body, &options, self.config.headers())
            .clean()
            .into_envelope();
        let binding = Arc::clone(&self.binding);
        let timeout = self.config.request_timeout();

        async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange(binding, method, envelope))
                    .await
                    .map_err(|_| SailsError::Timeout(limit))?,
                None => exchange(binding, method, envelope).await,
            }
        }
        .boxed()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Subscribe to a server-pushed event.
    pub fn on(&self, event: &str) -> EventStream<B> {
        EventStream::subscribe(Arc::clone(&self.binding), event)
    }

    /// Close the underlying connection.
    pub async fn disconnect(&self) -> Result<(), SailsError> {
        self.binding.close().await?;
        debug!(uri = self.config.uri(), "socket disconnected");
        Ok(())
    }
}

async fn exchange<B: SocketBinding>(
    binding: Arc<B>,
    method: RequestMethod,
    envelope: SailsRequest,
) -> Result<SailsResponse, SailsError> {
    let payload = envelope.to_payload();
    let (ack_tx, ack_rx) = oneshot::channel();

    debug!(%method, url = %envelope.url, "emitting request");
    binding
        .emit_with_ack(method.event_name(), payload, ack_tx)
        .await?;

    let raw = ack_rx.await.map_err(|_| SailsError::NoResponse)?;
    let response: SailsResponse =
        serde_json::from_value(raw).map_err(SailsError::MalformedResponse)?;
    debug!(%method, url = %envelope.url, status = response.status_code, "response received");

    if response.is_success() {
        Ok(response)
    } else {
        Err(SailsError::Status {
            method,
            url: envelope.url,
            response: Box::new(response),
        })
    }
}
