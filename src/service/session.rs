//! Tokio session driver for the forwarding handshake.
//!
//! [`ChannelConnection`] is the [`PlayerConnection`] used by real sessions:
//! packets go into a bounded queue that [`Session`] drains onto the socket.
//! [`Session::run_forwarding`] runs one handshake end to end, bounded by the
//! configured handshake timeout.

use crate::config::SessionConfig;
use crate::core::codec::ServerCodec;
use crate::core::packet::{ClientboundPacket, ServerboundPacket};
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::PlayerConnection;
use crate::protocol::handshake::{ForwardingHandshake, HandshakeOutcome};
use crate::protocol::profile::ForwardedProfile;
use crate::protocol::state::HandshakeSlot;
use crate::utils::timeout::with_timeout_error;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Connection backed by a bounded outbound queue
pub struct ChannelConnection {
    outbound: mpsc::Sender<ClientboundPacket>,
    slot: HandshakeSlot,
    profile: Mutex<Option<ForwardedProfile>>,
    closed: AtomicBool,
}

impl ChannelConnection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ClientboundPacket>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            outbound: tx,
            slot: HandshakeSlot::new(),
            profile: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        (conn, rx)
    }

    /// Profile recorded when login resumed, if it has
    pub fn profile(&self) -> Option<ForwardedProfile> {
        self.profile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether `disconnect` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl PlayerConnection for ChannelConnection {
    fn send_packet(&self, packet: ClientboundPacket) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.outbound.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => ProtocolError::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "outbound queue full",
            )),
            TrySendError::Closed(_) => ProtocolError::ConnectionClosed,
        })
    }

    fn disconnect(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(reason, "Disconnecting");
        if self
            .outbound
            .try_send(ClientboundPacket::disconnect(reason))
            .is_err()
        {
            warn!("Could not queue disconnect packet");
        }
    }

    fn forwarding_slot(&self) -> &HandshakeSlot {
        &self.slot
    }

    fn resume_login(&self, id: Uuid, username: &str) -> Result<()> {
        self.send_packet(ClientboundPacket::LoginSuccess {
            id,
            username: username.to_string(),
        })?;

        *self
            .profile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ForwardedProfile {
            id,
            username: username.to_string(),
        });
        Ok(())
    }
}

/// A login-phase session over a framed byte stream
pub struct Session<S> {
    framed: Framed<S, ServerCodec>,
    conn: ChannelConnection,
    outbound: mpsc::Receiver<ClientboundPacket>,
    handshake_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &SessionConfig) -> Self {
        let (conn, outbound) = ChannelConnection::new(config.outbound_queue);
        Self {
            framed: Framed::new(stream, ServerCodec::new()),
            conn,
            outbound,
            handshake_timeout: config.handshake_timeout,
        }
    }

    pub fn connection(&self) -> &ChannelConnection {
        &self.conn
    }

    /// Run the forwarding handshake for a player whose login start has been read.
    ///
    /// Returns `Ok(None)` when forwarding is disabled; the caller then logs
    /// the player in as usual. Otherwise returns the outcome after every
    /// resulting packet (login success or disconnect) has been flushed.
    #[instrument(skip(self, handshake, claimed_id), fields(player = %claimed_name))]
    pub async fn run_forwarding(
        &mut self,
        handshake: &ForwardingHandshake,
        claimed_name: &str,
        claimed_id: Uuid,
    ) -> Result<Option<HandshakeOutcome>> {
        if !handshake.begin(&self.conn, claimed_name, claimed_id)? {
            return Ok(None);
        }
        self.flush().await?;
        let deadline = Instant::now() + self.handshake_timeout;

        // Load the secret off the runtime thread while the peer answers.
        // A failure is cached and surfaces from handle_response if needed.
        if let Err(e) = handshake.config().resolve_secret_blocking().await {
            debug!(error = %e, "Forwarding secret unavailable before response");
        }

        let outcome = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let next = match with_timeout_error(self.framed.next(), remaining).await {
                Ok(next) => next,
                Err(e) => break handshake.abort(&self.conn, e),
            };

            match next {
                None => {
                    handshake.abort(&self.conn, ProtocolError::ConnectionClosed);
                    return Err(ProtocolError::ConnectionClosed);
                }
                Some(Err(e)) => break handshake.abort(&self.conn, e),
                Some(Ok(ServerboundPacket::PluginResponse(response))) => {
                    break handshake.handle_response(&self.conn, response)
                }
                Some(Ok(ServerboundPacket::Unknown { id, .. })) => {
                    debug!(packet_id = id, "Ignoring packet while awaiting forwarding response");
                }
            }
        };

        self.flush().await?;
        Ok(Some(outcome))
    }

    /// Write every queued packet to the stream
    async fn flush(&mut self) -> Result<()> {
        while let Ok(packet) = self.outbound.try_recv() {
            self.framed.feed(packet).await?;
        }
        SinkExt::<ClientboundPacket>::flush(&mut self.framed).await
    }
}
