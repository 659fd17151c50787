//! Per-connection forwarding state.
//!
//! A connection owns exactly one [`HandshakeSlot`]. The initiator stores a
//! [`HandshakeState`] in it and the response handler takes it back out. There
//! is no way to look at the state without clearing it, so a
//! second response frame always finds the slot empty.

use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Pending forwarding exchange for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeState {
    transaction_id: i32,
    claimed_name: String,
    claimed_id: Uuid,
}

impl HandshakeState {
    pub fn new(transaction_id: i32, claimed_name: impl Into<String>, claimed_id: Uuid) -> Self {
        Self {
            transaction_id,
            claimed_name: claimed_name.into(),
            claimed_id,
        }
    }

    /// Correlation token sent in the challenge
    pub fn transaction_id(&self) -> i32 {
        self.transaction_id
    }

    /// Username from the login start that preceded forwarding
    pub fn claimed_name(&self) -> &str {
        &self.claimed_name
    }

    /// UUID from the login start that preceded forwarding
    pub fn claimed_id(&self) -> Uuid {
        self.claimed_id
    }
}

/// Single-consumer mailbox holding at most one [`HandshakeState`]
#[derive(Debug, Default)]
pub struct HandshakeSlot {
    inner: Mutex<Option<HandshakeState>>,
}

impl HandshakeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state`, replacing anything already pending
    pub fn store(&self, state: HandshakeState) {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("handshake slot lock poisoned; recovering");
            poisoned.into_inner()
        });
        *guard = Some(state);
    }

    /// Take the pending state, leaving the slot empty
    pub fn take(&self) -> Option<HandshakeState> {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("handshake slot lock poisoned; recovering");
            poisoned.into_inner()
        });
        guard.take()
    }
}
