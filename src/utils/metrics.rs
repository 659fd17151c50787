//! Observability and Metrics
//!
//! Counters for forwarding handshakes. The unforwarded fallback is counted on
//! its own so it never blends into the failure counters.
//!
//! Uses atomic counters for thread-safe metrics collection.

use crate::error::ProtocolError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for forwarding handshakes
#[derive(Debug)]
pub struct Metrics {
    /// Challenges sent
    pub handshakes_started: AtomicU64,
    /// Logins resumed with a verified forwarded identity
    pub resumed_forwarded: AtomicU64,
    /// Logins resumed with the claimed identity because the peer sent no payload
    pub resumed_fallback: AtomicU64,
    /// Response frames that arrived with no pending handshake
    pub responses_ignored: AtomicU64,
    /// Transaction mismatches and oversized strings
    pub rejected_protocol: AtomicU64,
    /// Integrity check failures
    pub rejected_security: AtomicU64,
    /// Missing or unloadable secret
    pub rejected_config: AtomicU64,
    /// Truncated payloads, bad addresses and unsupported versions
    pub rejected_decode: AtomicU64,
    /// Peers without forwarding while forwarding is required
    pub rejected_policy: AtomicU64,
    /// Timeouts and closed connections while waiting for a response
    pub rejected_transport: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            handshakes_started: AtomicU64::new(0),
            resumed_forwarded: AtomicU64::new(0),
            resumed_fallback: AtomicU64::new(0),
            responses_ignored: AtomicU64::new(0),
            rejected_protocol: AtomicU64::new(0),
            rejected_security: AtomicU64::new(0),
            rejected_config: AtomicU64::new(0),
            rejected_decode: AtomicU64::new(0),
            rejected_policy: AtomicU64::new(0),
            rejected_transport: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a challenge being sent
    pub fn handshake_started(&self) {
        self.handshakes_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a login resumed from a verified payload
    pub fn resumed_with_forwarding(&self) {
        self.resumed_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a login resumed without forwarding
    pub fn resumed_without_forwarding(&self) {
        self.resumed_fallback.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unsolicited or duplicate response
    pub fn response_ignored(&self) {
        self.responses_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejection, bucketed by error kind
    pub fn rejected(&self, error: &ProtocolError) {
        let counter = match error {
            ProtocolError::ProtocolViolation(_) => &self.rejected_protocol,
            ProtocolError::SecurityViolation(_) => &self.rejected_security,
            ProtocolError::ConfigurationFault(_) | ProtocolError::ConfigError(_) => {
                &self.rejected_config
            }
            ProtocolError::MalformedInput(_)
            | ProtocolError::UnsupportedVersion(_)
            | ProtocolError::InvalidAddress(_) => &self.rejected_decode,
            ProtocolError::ForwardingRequired => &self.rejected_policy,
            ProtocolError::Io(_) | ProtocolError::Timeout | ProtocolError::ConnectionClosed => {
                &self.rejected_transport
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            handshakes_started: self.handshakes_started.load(Ordering::Relaxed),
            resumed_forwarded: self.resumed_forwarded.load(Ordering::Relaxed),
            resumed_fallback: self.resumed_fallback.load(Ordering::Relaxed),
            responses_ignored: self.responses_ignored.load(Ordering::Relaxed),
            rejected_protocol: self.rejected_protocol.load(Ordering::Relaxed),
            rejected_security: self.rejected_security.load(Ordering::Relaxed),
            rejected_config: self.rejected_config.load(Ordering::Relaxed),
            rejected_decode: self.rejected_decode.load(Ordering::Relaxed),
            rejected_policy: self.rejected_policy.load(Ordering::Relaxed),
            rejected_transport: self.rejected_transport.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            handshakes_started = snapshot.handshakes_started,
            resumed_forwarded = snapshot.resumed_forwarded,
            resumed_fallback = snapshot.resumed_fallback,
            responses_ignored = snapshot.responses_ignored,
            rejected_protocol = snapshot.rejected_protocol,
            rejected_security = snapshot.rejected_security,
            rejected_config = snapshot.rejected_config,
            rejected_decode = snapshot.rejected_decode,
            rejected_policy = snapshot.rejected_policy,
            rejected_transport = snapshot.rejected_transport,
            uptime_seconds = snapshot.uptime_seconds,
            "Forwarding metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub handshakes_started: u64,
    pub resumed_forwarded: u64,
    pub resumed_fallback: u64,
    pub responses_ignored: u64,
    pub rejected_protocol: u64,
    pub rejected_security: u64,
    pub rejected_config: u64,
    pub rejected_decode: u64,
    pub rejected_policy: u64,
    pub rejected_transport: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Sum of every rejection bucket
    pub fn rejected_total(&self) -> u64 {
        self.rejected_protocol
            + self.rejected_security
            + self.rejected_config
            + self.rejected_decode
            + self.rejected_policy
            + self.rejected_transport
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
