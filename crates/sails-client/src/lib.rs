//! Socket.io client for Sails.js backends.
//!
//! Issues HTTP-verb-shaped requests over one persistent socket connection
//! and exposes server-pushed events as streams.
//!
//! ```no_run
//! # async fn demo() -> Result<(), sails_client::error::SailsError> {
//! use sails_client::client::SailsClient;
//! use sails_client::sails_core::config::{ClientConfig, Headless};
//! use sails_client::sails_core::protocol::RequestOptions;
//!
//! let config = ClientConfig::new()
//!     .with_uri("http://localhost:1337")
//!     .resolve(&Headless)?;
//! let client = SailsClient::connect(config).await?;
//!
//! let users = client.get("/user", RequestOptions::new().param("limit", 10)).await?;
//! println!("{}", users.body);
//!
//! let mut created = client.on("user");
//! while let Some(msg) = created.recv().await {
//!     println!("{msg}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod client;
pub mod error;
pub mod events;
pub mod memory;

#[cfg(feature = "native")]
pub mod io_socket;

pub use sails_core;
