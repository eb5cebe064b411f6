use std::time::Duration;

use sails_core::config::ConfigError;
use sails_core::protocol::{RequestMethod, SailsResponse};
use thiserror::Error;

use crate::binding::BindingError;

#[derive(Debug, Error)]
pub enum SailsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("socket connection failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Binding(#[from] BindingError),

    /// The ack was dropped without a value, e.g. the socket went away.
    #[error("socket closed before the server responded")]
    NoResponse,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response envelope: {0}")]
    MalformedResponse(#[source] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("{method} {url} failed with status {}", .response.status_code)]
    Status {
        method: RequestMethod,
        url: String,
        response: Box<SailsResponse>,
    },
}

impl SailsError {
    /// The server's response, for [`SailsError::Status`].
    pub fn response(&self) -> Option<&SailsResponse> {
        match self {
            SailsError::Status { response, .. } => Some(&**response),
            _ => None,
        }
    }
}
