//! # gateway-forwarding
//!
//! Forwarded-identity handshake for a game-server proxy that sits behind an
//! upstream gateway.
//!
//! During login the proxy challenges the peer on the `velocity:player_info`
//! plugin channel. The gateway answers with an HMAC-SHA256 signed payload
//! carrying the player's real address, UUID and username. The proxy verifies
//! the tag with a pre-shared secret, decodes the profile, and resumes login
//! with the forwarded identity, or turns the connection away.
//!
//! ## Modules
//! - [`core`]: wire primitives, login packets, frame codec
//! - [`protocol`]: the handshake, integrity check and profile decoder
//! - [`service`]: tokio session driver
//! - [`config`]: TOML/env configuration and the lazily loaded secret
//! - [`utils`]: logging, metrics, timeouts
//!
//! ## Example
//! ```rust
//! use gateway_forwarding::config::ForwardingConfig;
//! use gateway_forwarding::protocol::handshake::ForwardingHandshake;
//! use gateway_forwarding::protocol::integrity::ForwardingSecret;
//!
//! let config = ForwardingConfig::with_secret(true, ForwardingSecret::new(b"secret".to_vec()));
//! let handshake = ForwardingHandshake::new(config);
//! assert!(handshake.config().enabled);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod utils;

pub use error::{ProtocolError, Result};
