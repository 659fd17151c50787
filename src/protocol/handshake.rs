//! Forwarding handshake: challenge the gateway, verify its answer, resume login.
//!
//! ```text
//!   begin()                               handle_response()
//!     |                                        |
//!  NO_HANDSHAKE --store state + challenge--> PENDING --take state--> RESUMED | REJECTED
//!                                                     (slot empty)--> ignored
//! ```
//!
//! The pending [`HandshakeState`] lives in the connection's [`HandshakeSlot`].
//! `handle_response` takes it out before looking at the frame, so a second or
//! late response always finds the slot empty and is dropped without effect.
//!
//! Checks on a response run in a fixed order:
//! 1. transaction id must match (before any cryptography)
//! 2. absent payload: resume with the claimed identity, unless forwarding is required
//! 3. the secret must be available
//! 4. the HMAC tag must verify
//! 5. the signed region must decode

use crate::config::ForwardingConfig;
use crate::core::packet::{ClientboundPacket, LoginPluginRequest, LoginPluginResponse};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::{NoopHook, PlayerConnection, PreLoginEvent, PreLoginHook};
use crate::protocol::integrity;
use crate::protocol::profile::{
    self, ForwardedPlayer, ForwardedProfile, MAX_SUPPORTED_FORWARDING_VERSION,
};
use crate::protocol::state::HandshakeState;
use crate::utils::metrics::{Metrics, Timer};
use bytes::Bytes;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Plugin channel carrying forwarded player info
pub const PLAYER_INFO_CHANNEL: &str = "velocity:player_info";

/// Result of handling one response frame
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// No handshake was pending; nothing happened
    Ignored,
    /// Login continued with `profile`, after the pre-login hook ran
    Resumed {
        profile: ForwardedProfile,
        /// `true` when the identity came from a verified payload
        forwarded: bool,
        /// `false` when the hook withheld the login-success reply
        login_sent: bool,
    },
    /// The connection was closed
    Rejected(ProtocolError),
}

impl HandshakeOutcome {
    pub fn is_resumed(&self) -> bool {
        matches!(self, HandshakeOutcome::Resumed { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, HandshakeOutcome::Rejected(_))
    }
}

/// Identity accepted by the checks, before the hook runs
enum Verified {
    Forwarded(ForwardedPlayer),
    Fallback(ForwardedProfile),
}

/// Forwarding handshake driver, shared by all connections
pub struct ForwardingHandshake {
    config: ForwardingConfig,
    hook: Arc<dyn PreLoginHook>,
    metrics: Arc<Metrics>,
}

impl ForwardingHandshake {
    pub fn new(config: ForwardingConfig) -> Self {
        Self {
            config,
            hook: Arc::new(NoopHook),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Replace the pre-login hook
    pub fn with_hook(mut self, hook: Arc<dyn PreLoginHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Report into a shared metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Start forwarding for a connection that just sent its login start.
    ///
    /// Returns `Ok(false)` without side effects when forwarding is disabled;
    /// the caller continues its normal login. `Ok(true)` means a challenge is
    /// out and the caller must wait for the response.
    #[instrument(skip(self, conn, claimed_id), fields(player = %claimed_name))]
    pub fn begin<C>(&self, conn: &C, claimed_name: &str, claimed_id: Uuid) -> Result<bool>
    where
        C: PlayerConnection + ?Sized,
    {
        if !self.config.enabled {
            return Ok(false);
        }

        let transaction_id = rand::random::<i32>();
        conn.forwarding_slot()
            .store(HandshakeState::new(transaction_id, claimed_name, claimed_id));

        let challenge = ClientboundPacket::PluginRequest(LoginPluginRequest {
            transaction_id,
            channel: PLAYER_INFO_CHANNEL.to_string(),
            data: Bytes::from_static(&[MAX_SUPPORTED_FORWARDING_VERSION]),
        });

        if let Err(e) = conn.send_packet(challenge) {
            conn.forwarding_slot().take();
            return Err(e);
        }

        self.metrics.handshake_started();
        debug!(transaction_id, "Sent forwarding challenge");
        Ok(true)
    }

    /// Consume a response frame and finish the handshake.
    #[instrument(skip(self, conn, response), fields(transaction_id = response.transaction_id))]
    pub fn handle_response<C>(&self, conn: &C, response: LoginPluginResponse) -> HandshakeOutcome
    where
        C: PlayerConnection + ?Sized,
    {
        let _timer = Timer::start("forwarding_response");

        let Some(state) = conn.forwarding_slot().take() else {
            self.metrics.response_ignored();
            debug!("No pending forwarding handshake; ignoring response");
            return HandshakeOutcome::Ignored;
        };

        match self.verify_response(&state, response) {
            Ok(Verified::Forwarded(player)) => {
                info!(
                    player = %player.profile.username,
                    uuid = %player.profile.id,
                    address = %player.address,
                    "Verified forwarded player"
                );
                self.resume(conn, player.profile, Some(player.address), true)
            }
            Ok(Verified::Fallback(profile)) => {
                info!(
                    player = %profile.username,
                    "Peer sent no forwarding data; continuing with login-start identity"
                );
                self.resume(conn, profile, None, false)
            }
            Err(e) => self.reject(conn, e),
        }
    }

    /// Close the connection after a handshake failure detected elsewhere,
    /// such as a timeout in the session driver.
    pub fn abort<C>(&self, conn: &C, error: ProtocolError) -> HandshakeOutcome
    where
        C: PlayerConnection + ?Sized,
    {
        if conn.forwarding_slot().take().is_none() {
            return HandshakeOutcome::Ignored;
        }
        self.reject(conn, error)
    }

    fn verify_response(
        &self,
        state: &HandshakeState,
        response: LoginPluginResponse,
    ) -> Result<Verified> {
        if state.transaction_id() != response.transaction_id {
            return Err(ProtocolError::ProtocolViolation(format!(
                "{}: expected {}, got {}",
                constants::ERR_TRANSACTION_MISMATCH,
                state.transaction_id(),
                response.transaction_id
            )));
        }

        let Some(mut payload) = response.payload else {
            if self.config.required {
                return Err(ProtocolError::ForwardingRequired);
            }
            return Ok(Verified::Fallback(ForwardedProfile {
                id: state.claimed_id(),
                username: state.claimed_name().to_string(),
            }));
        };

        let secret = self.config.secret()?;

        if !integrity::verify(&mut payload, &secret)? {
            return Err(ProtocolError::SecurityViolation(
                constants::ERR_SIGNATURE_MISMATCH.into(),
            ));
        }

        let player = profile::decode_forwarded(&mut payload)?;
        Ok(Verified::Forwarded(player))
    }

    fn resume<C>(
        &self,
        conn: &C,
        profile: ForwardedProfile,
        address: Option<IpAddr>,
        forwarded: bool,
    ) -> HandshakeOutcome
    where
        C: PlayerConnection + ?Sized,
    {
        let mut event = PreLoginEvent::new(profile.id, profile.username, address, forwarded);
        self.hook.pre_login(&mut event);

        let login_sent = event.can_send_success();
        if login_sent {
            if let Err(e) = conn.resume_login(event.id, &event.username) {
                return self.reject(conn, e);
            }
        } else {
            debug!(player = %event.username, "Pre-login hook withheld login success");
        }

        if forwarded {
            self.metrics.resumed_with_forwarding();
        } else {
            self.metrics.resumed_without_forwarding();
        }

        HandshakeOutcome::Resumed {
            profile: ForwardedProfile {
                id: event.id,
                username: event.username,
            },
            forwarded,
            login_sent,
        }
    }

    fn reject<C>(&self, conn: &C, error: ProtocolError) -> HandshakeOutcome
    where
        C: PlayerConnection + ?Sized,
    {
        match &error {
            ProtocolError::SecurityViolation(_) => {
                warn!(error = %error, "Possible forged forwarding payload")
            }
            ProtocolError::ConfigurationFault(_) => {
                error!(error = %error, "Forwarding secret unavailable; rejecting connection")
            }
            ProtocolError::ForwardingRequired => {
                info!("Peer did not forward player data; forwarding is required")
            }
            _ => warn!(
                error = %error,
                category = error.category(),
                "Forwarding verification failed"
            ),
        }

        self.metrics.rejected(&error);
        conn.disconnect(error.disconnect_reason());
        HandshakeOutcome::Rejected(error)
    }
}
