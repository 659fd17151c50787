//! # Services
//!
//! Async drivers that run the forwarding handshake over real byte streams.

pub mod session;

pub use session::{ChannelConnection, Session};
