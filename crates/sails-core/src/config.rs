//! Client configuration and its one-time resolution.
//!
//! A [`ClientConfig`] is what the caller writes (or loads from JSON). It is
//! resolved once, at client construction, into a [`ResolvedConfig`] that
//! never changes afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::protocol::{HeaderMap, Params, query_text};

// ---------------------------------------------------------------------------
// SDK identification
// ---------------------------------------------------------------------------

pub const SDK_VERSION_KEY: &str = "__sails_io_sdk_version";
pub const SDK_VERSION_VALUE: &str = "1.1.12";
pub const SDK_PLATFORM_KEY: &str = "__sails_io_sdk_platform";
pub const SDK_PLATFORM_VALUE: &str = "browser";
pub const SDK_LANGUAGE_KEY: &str = "__sails_io_sdk_language";
pub const SDK_LANGUAGE_VALUE: &str = "javascript";

/// Default socket.io endpoint path on a Sails server.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    /// No explicit URI and the environment has no page origin.
    #[error(
        "could not configure socket.io connection: no page origin is available, provide the URI in the client config"
    )]
    MissingUri,

    #[error("invalid socket URI `{uri}`: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// The socket endpoint path comes from `options.path`, not from the URI.
    #[error("socket URI `{0}` must not carry a path; set `options.path` instead")]
    UriHasPath(String),
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Where a default URI comes from when the config has none.
pub trait EnvironmentProvider {
    /// The hosting page's origin (e.g. `https://app.example.com`), if the
    /// environment has such a thing.
    fn page_origin(&self) -> Option<String>;
}

/// A host with no page, such as a native process. Never yields an origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl EnvironmentProvider for Headless {
    fn page_origin(&self) -> Option<String> {
        None
    }
}

/// A fixed origin, for embedding hosts that know it up front and for tests.
#[derive(Debug, Clone)]
pub struct StaticOrigin(pub String);

impl EnvironmentProvider for StaticOrigin {
    fn page_origin(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Connection options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

/// Socket connection options.
///
/// Unset fields fall back to the defaults applied by
/// [`ClientConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<TransportKind>>,
    /// socket.io endpoint path; [`DEFAULT_SOCKET_PATH`] when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// socket.io namespace; `/` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Extra query parameters sent with the connection handshake.
    /// Non-string values are sent as their JSON text.
    #[serde(skip_serializing_if = "Params::is_empty")]
    pub query: Params,
    /// Headers sent with the connection handshake.
    #[serde(skip_serializing_if = "HeaderMap::is_empty")]
    pub extra_headers: HeaderMap,
    /// Per-request deadline. No deadline when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl ConnectOptions {
    fn merged_over_defaults(caller: Option<&ConnectOptions>) -> Self {
        let mut query: Params = [
            (SDK_VERSION_KEY, SDK_VERSION_VALUE),
            (SDK_PLATFORM_KEY, SDK_PLATFORM_VALUE),
            (SDK_LANGUAGE_KEY, SDK_LANGUAGE_VALUE),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::from(value)))
        .collect();

        let Some(caller) = caller else {
            return Self {
                transports: Some(vec![TransportKind::Websocket]),
                query,
                ..Self::default()
            };
        };

        query.extend(caller.query.clone());
        Self {
            transports: Some(
                caller
                    .transports
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| vec![TransportKind::Websocket]),
            ),
            path: caller.path.clone(),
            namespace: caller.namespace.clone(),
            query,
            extra_headers: caller.extra_headers.clone(),
            request_timeout_ms: caller.request_timeout_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Caller-facing configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://localhost:1337`. Must not carry a path;
    /// the socket endpoint is chosen with [`ConnectOptions::path`].
    pub uri: Option<String>,
    /// Headers merged into every request.
    pub headers: Option<HeaderMap>,
    pub options: Option<ConnectOptions>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit, non-empty `uri` wins; otherwise the environment's page
    /// origin is used. With neither, this fails with
    /// [`ConfigError::MissingUri`]. A URI with a path other than `/` is
    /// rejected with [`ConfigError::UriHasPath`].
    pub fn resolve(&self, env: &dyn EnvironmentProvider) -> Result<ResolvedConfig, ConfigError> {
        let uri = self
            .uri
            .clone()
            .filter(|uri| !uri.is_empty())
            .or_else(|| env.page_origin())
            .ok_or(ConfigError::MissingUri)?;

        let parsed = Url::parse(&uri).map_err(|source| ConfigError::InvalidUri {
            uri: uri.clone(),
            source,
        })?;
        if !matches!(parsed.path(), "" | "/") {
            return Err(ConfigError::UriHasPath(uri));
        }

        Ok(ResolvedConfig {
            uri,
            headers: self.headers.clone().unwrap_or_default(),
            options: ConnectOptions::merged_over_defaults(self.options.as_ref()),
        })
    }
}

// ---------------------------------------------------------------------------
// ResolvedConfig
// ---------------------------------------------------------------------------

/// The effective configuration. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    uri: String,
    headers: HeaderMap,
    options: ConnectOptions,
}

impl ResolvedConfig {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Default headers for every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn transports(&self) -> &[TransportKind] {
        self.options.transports.as_deref().unwrap_or(&[])
    }

    pub fn namespace(&self) -> &str {
        self.options.namespace.as_deref().unwrap_or("/")
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.options.request_timeout_ms.map(Duration::from_millis)
    }

    /// The socket.io handshake URL: origin, endpoint path and query.
    pub fn connect_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.uri).map_err(|source| ConfigError::InvalidUri {
            uri: self.uri.clone(),
            source,
        })?;
        url.set_path(self.options.path.as_deref().unwrap_or(DEFAULT_SOCKET_PATH));
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.options.query {
                pairs.append_pair(key, &query_text(value));
            }
        }
        Ok(url)
    }
}
