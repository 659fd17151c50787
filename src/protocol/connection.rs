//! Seams between the forwarding handshake and the surrounding proxy.
//!
//! The handshake never touches sockets directly. It talks to a
//! [`PlayerConnection`] for I/O and to a [`PreLoginHook`] before login resumes.

use crate::core::packet::ClientboundPacket;
use crate::error::Result;
use crate::protocol::state::HandshakeSlot;
use std::net::IpAddr;
use uuid::Uuid;

/// What the handshake needs from a connection
pub trait PlayerConnection: Send + Sync {
    /// Queue a packet for the peer
    fn send_packet(&self, packet: ClientboundPacket) -> Result<()>;

    /// Close the connection with a player-facing reason
    fn disconnect(&self, reason: &str);

    /// The connection's forwarding slot
    fn forwarding_slot(&self) -> &HandshakeSlot;

    /// Record the final profile and send login success.
    ///
    /// An error means login success never reached the peer; the handshake
    /// then rejects the connection instead of leaving it half logged in.
    fn resume_login(&self, id: Uuid, username: &str) -> Result<()>;
}

/// Event raised before login resumes.
///
/// Hooks may replace the id or username, or withhold the login-success reply
/// (for instance to finish login themselves later).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreLoginEvent {
    pub id: Uuid,
    pub username: String,
    /// Address reported by the gateway, when forwarding supplied one
    pub forwarded_address: Option<IpAddr>,
    /// Whether the identity came from a verified forwarding payload
    pub forwarded: bool,
    send_success: bool,
}

impl PreLoginEvent {
    pub fn new(
        id: Uuid,
        username: impl Into<String>,
        forwarded_address: Option<IpAddr>,
        forwarded: bool,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            forwarded_address,
            forwarded,
            send_success: true,
        }
    }

    /// Whether login success should be sent after the hook returns
    pub fn can_send_success(&self) -> bool {
        self.send_success
    }

    /// Stop the handshake from sending login success
    pub fn withhold_success(&mut self) {
        self.send_success = false;
    }
}

/// Receives the pre-login event
pub trait PreLoginHook: Send + Sync {
    fn pre_login(&self, event: &mut PreLoginEvent);
}

/// Hook that leaves every event unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl PreLoginHook for NoopHook {
    fn pre_login(&self, _event: &mut PreLoginEvent) {}
}

impl<F> PreLoginHook for F
where
    F: Fn(&mut PreLoginEvent) + Send + Sync,
{
    fn pre_login(&self, event: &mut PreLoginEvent) {
        self(event)
    }
}
