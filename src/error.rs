//! # Error Types
//!
//! Error handling for the forwarding handshake.
//!
//! Every variant here is terminal for the connection attempt that produced it.
//! Nothing is retried and no connection is left open in a degraded mode.
//!
//! ## Error Categories
//! - **Decode Errors**: exhausted buffers, length overruns, bad addresses
//! - **Protocol Errors**: transaction mismatch, oversized strings, unknown versions
//! - **Security Errors**: forged or tampered forwarding payloads
//! - **Configuration Errors**: missing or unloadable forwarding secret
//! - **Policy Rejections**: peer cannot forward while forwarding is required
//!
//! ## Example Usage
//! ```rust
//! use gateway_forwarding::error::{ProtocolError, Result};
//!
//! fn check_version(version: u32) -> Result<()> {
//!     if version > 4 {
//!         return Err(ProtocolError::UnsupportedVersion(version));
//!     }
//!     Ok(())
//! }
//!
//! let err = check_version(5).unwrap_err();
//! assert_eq!(err.category(), "unsupported_version");
//! ```

use std::io;
use thiserror::Error;

/// Static disconnect reasons and log messages.
pub mod constants {
    /// Player-facing disconnect reasons
    pub const REASON_VERIFICATION_FAILED: &str = "Forwarding verification failed";
    pub const REASON_UNVERIFIED_DETAILS: &str = "Unable to verify player details.";
    pub const REASON_GATEWAY_REQUIRED: &str = "You must connect through the gateway.";
    pub const REASON_TIMED_OUT: &str = "Timed out waiting for forwarding response";

    /// Decode errors
    pub const ERR_BUFFER_EXHAUSTED: &str = "Buffer exhausted before value was fully read";
    pub const ERR_VARINT_TOO_LONG: &str = "VarInt exceeds 5 bytes";
    pub const ERR_FRAME_TOO_LARGE: &str = "Frame exceeds maximum size";
    pub const ERR_INVALID_UTF8: &str = "String is not valid UTF-8";
    pub const ERR_NEGATIVE_LENGTH: &str = "Negative length prefix";

    /// Protocol errors
    pub const ERR_TRANSACTION_MISMATCH: &str = "Mismatched transaction ID";
    pub const ERR_UNKNOWN_PACKET: &str = "Unknown packet id";

    /// Security and configuration errors
    pub const ERR_SIGNATURE_MISMATCH: &str = "Forwarded payload failed integrity check";
    pub const ERR_SECRET_UNAVAILABLE: &str = "Forwarding secret not loaded";
    pub const ERR_SECRET_EMPTY: &str = "Forwarding secret file is empty";
}

/// ProtocolError is the primary error type for forwarding operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Unsupported forwarding version: {0}")]
    UnsupportedVersion(u32),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Configuration fault: {0}")]
    ConfigurationFault(String),

    #[error("Invalid forwarded address: {0}")]
    InvalidAddress(String),

    #[error("Peer did not forward player data and forwarding is required")]
    ForwardingRequired,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,
}

impl ProtocolError {
    /// Reason shown to the player when this error ends the connection.
    pub fn disconnect_reason(&self) -> &'static str {
        match self {
            ProtocolError::SecurityViolation(_) => constants::REASON_UNVERIFIED_DETAILS,
            ProtocolError::ForwardingRequired => constants::REASON_GATEWAY_REQUIRED,
            ProtocolError::Timeout => constants::REASON_TIMED_OUT,
            _ => constants::REASON_VERIFICATION_FAILED,
        }
    }

    /// Stable label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            ProtocolError::Io(_) => "io",
            ProtocolError::MalformedInput(_) => "malformed_input",
            ProtocolError::ProtocolViolation(_) => "protocol_violation",
            ProtocolError::UnsupportedVersion(_) => "unsupported_version",
            ProtocolError::SecurityViolation(_) => "security_violation",
            ProtocolError::ConfigurationFault(_) => "configuration_fault",
            ProtocolError::InvalidAddress(_) => "invalid_address",
            ProtocolError::ForwardingRequired => "forwarding_required",
            ProtocolError::ConfigError(_) => "config_error",
            ProtocolError::Timeout => "timeout",
            ProtocolError::ConnectionClosed => "connection_closed",
        }
    }

    /// Shorthand for the common buffer-exhausted case.
    pub(crate) fn exhausted() -> Self {
        ProtocolError::MalformedInput(constants::ERR_BUFFER_EXHAUSTED.into())
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
