//! # Forwarding Protocol
//!
//! The gateway forwarding handshake and the pieces it is built from.
//!
//! ## Components
//! - **Handshake**: challenge/response driver ([`handshake::ForwardingHandshake`])
//! - **Integrity**: HMAC-SHA256 tag check over the signed payload
//! - **Profile**: decoder for the address, profile and property list
//! - **State**: single-use per-connection handshake state
//! - **Connection**: traits the surrounding proxy implements
//!
//! ## Security
//! - Transaction ids are checked before any cryptography
//! - Constant-time tag comparison
//! - Every failure closes the connection; nothing falls back silently

pub mod connection;
pub mod handshake;
pub mod integrity;
pub mod profile;
pub mod state;
