//! Login-phase packets used by the forwarding exchange.
//!
//! A frame body is `[VarInt packet id] [packet fields]`. Ids overlap between
//! directions, so each direction gets its own closed enum. Unrecognised
//! serverbound ids decode to [`ServerboundPacket::Unknown`] so callers can
//! skip them.

use crate::core::wire;
use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Clientbound login disconnect
pub const LOGIN_DISCONNECT_ID: i32 = 0x00;

/// Clientbound login success
pub const LOGIN_SUCCESS_ID: i32 = 0x02;

/// Clientbound login plugin request
pub const LOGIN_PLUGIN_REQUEST_ID: i32 = 0x04;

/// Serverbound login plugin response
pub const LOGIN_PLUGIN_RESPONSE_ID: i32 = 0x02;

/// Upper bound on channel identifiers and disconnect reasons
pub const MAX_STRING_LEN: usize = 32767;

/// A packet with a fixed id and a wire layout
pub trait WirePacket: Sized {
    /// Numeric packet id written before the fields
    fn id(&self) -> i32;

    /// Write the fields (not the id)
    fn write_fields(&self, buf: &mut BytesMut);

    /// Decode a complete frame body, id included
    fn decode(body: Bytes) -> Result<Self>;

    /// Encode id and fields into `buf`
    fn encode(&self, buf: &mut BytesMut) {
        wire::write_varint(buf, self.id());
        self.write_fields(buf);
    }

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Challenge sent to the peer, asking for forwarded player data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginRequest {
    pub transaction_id: i32,
    pub channel: String,
    pub data: Bytes,
}

/// The peer's answer to a [`LoginPluginRequest`].
///
/// `payload` is `None` when the peer does not understand the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginResponse {
    pub transaction_id: i32,
    pub payload: Option<Bytes>,
}

/// Packets this side writes during login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientboundPacket {
    /// Reason is a JSON text component
    Disconnect { reason: String },
    LoginSuccess { id: Uuid, username: String },
    PluginRequest(LoginPluginRequest),
}

impl ClientboundPacket {
    /// Disconnect carrying `reason` as a plain text component
    pub fn disconnect(reason: &str) -> Self {
        ClientboundPacket::Disconnect {
            reason: serde_json::json!({ "text": reason }).to_string(),
        }
    }
}

impl WirePacket for ClientboundPacket {
    fn id(&self) -> i32 {
        match self {
            ClientboundPacket::Disconnect { .. } => LOGIN_DISCONNECT_ID,
            ClientboundPacket::LoginSuccess { .. } => LOGIN_SUCCESS_ID,
            ClientboundPacket::PluginRequest(_) => LOGIN_PLUGIN_REQUEST_ID,
        }
    }

    fn write_fields(&self, buf: &mut BytesMut) {
        match self {
            ClientboundPacket::Disconnect { reason } => wire::write_string(buf, reason),
            ClientboundPacket::LoginSuccess { id, username } => {
                wire::write_uuid(buf, id);
                wire::write_string(buf, username);
                // no profile properties
                wire::write_varint(buf, 0);
            }
            ClientboundPacket::PluginRequest(p) => {
                wire::write_varint(buf, p.transaction_id);
                wire::write_string(buf, &p.channel);
                buf.put_slice(&p.data);
            }
        }
    }

    fn decode(mut body: Bytes) -> Result<Self> {
        let id = wire::read_varint(&mut body)?;
        match id {
            LOGIN_DISCONNECT_ID => Ok(ClientboundPacket::Disconnect {
                reason: wire::read_bounded_string(&mut body, MAX_STRING_LEN)?,
            }),
            LOGIN_SUCCESS_ID => {
                let id = wire::read_uuid(&mut body)?;
                let username = wire::read_bounded_string(&mut body, 16)?;
                Ok(ClientboundPacket::LoginSuccess { id, username })
            }
            LOGIN_PLUGIN_REQUEST_ID => {
                let transaction_id = wire::read_varint(&mut body)?;
                let channel = wire::read_bounded_string(&mut body, MAX_STRING_LEN)?;
                let len = body.remaining();
                Ok(ClientboundPacket::PluginRequest(LoginPluginRequest {
                    transaction_id,
                    channel,
                    data: body.copy_to_bytes(len),
                }))
            }
            other => Err(ProtocolError::ProtocolViolation(format!(
                "{}: {other:#04x}",
                constants::ERR_UNKNOWN_PACKET
            ))),
        }
    }
}

/// Packets this side reads during login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerboundPacket {
    PluginResponse(LoginPluginResponse),
    /// Any other login packet; the body is left undecoded
    Unknown { id: i32, body: Bytes },
}

impl WirePacket for ServerboundPacket {
    fn id(&self) -> i32 {
        match self {
            ServerboundPacket::PluginResponse(_) => LOGIN_PLUGIN_RESPONSE_ID,
            ServerboundPacket::Unknown { id, .. } => *id,
        }
    }

    fn write_fields(&self, buf: &mut BytesMut) {
        match self {
            ServerboundPacket::PluginResponse(p) => {
                wire::write_varint(buf, p.transaction_id);
                wire::write_optional_payload(buf, p.payload.as_deref());
            }
            ServerboundPacket::Unknown { body, .. } => buf.put_slice(body),
        }
    }

    fn decode(mut body: Bytes) -> Result<Self> {
        let id = wire::read_varint(&mut body)?;
        match id {
            LOGIN_PLUGIN_RESPONSE_ID => {
                let transaction_id = wire::read_varint(&mut body)?;
                let payload = wire::read_optional_payload(&mut body)?;
                Ok(ServerboundPacket::PluginResponse(LoginPluginResponse {
                    transaction_id,
                    payload,
                }))
            }
            _ => Ok(ServerboundPacket::Unknown { id, body }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let packet = ClientboundPacket::PluginRequest(LoginPluginRequest {
            transaction_id: 7,
            channel: "velocity:player_info".into(),
            data: Bytes::from_static(&[4]),
        });
        let bytes = packet.to_bytes();

        assert_eq!(bytes[0], 0x04);
        assert_eq!(bytes[1], 7);
        assert_eq!(bytes[2] as usize, "velocity:player_info".len());
        assert_eq!(&bytes[3..23], b"velocity:player_info");
        assert_eq!(&bytes[23..], &[4]);

        assert_eq!(ClientboundPacket::decode(bytes).unwrap(), packet);
    }

    #[test]
    fn test_response_absent_payload() {
        let bytes = Bytes::from_static(&[0x02, 0x2A, 0x00]);
        match ServerboundPacket::decode(bytes).unwrap() {
            ServerboundPacket::PluginResponse(resp) => {
                assert_eq!(resp.transaction_id, 42);
                assert!(resp.payload.is_none());
            }
            other => panic!("Unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_serverbound_kept_raw() {
        let bytes = Bytes::from_static(&[0x03, 0x01, 0x02]);
        assert_eq!(
            ServerboundPacket::decode(bytes).unwrap(),
            ServerboundPacket::Unknown {
                id: 3,
                body: Bytes::from_static(&[0x01, 0x02])
            }
        );
    }

    #[test]
    fn test_truncated_response_is_malformed() {
        let bytes = Bytes::from_static(&[0x02, 0x2A]);
        assert!(matches!(
            ServerboundPacket::decode(bytes),
            Err(ProtocolError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_disconnect_reason_is_json_text() {
        let packet = ClientboundPacket::disconnect("Forwarding verification failed");
        match ClientboundPacket::decode(packet.to_bytes()).unwrap() {
            ClientboundPacket::Disconnect { reason } => {
                let value: serde_json::Value = serde_json::from_str(&reason).unwrap();
                assert_eq!(value["text"], "Forwarding verification failed");
            }
            other => panic!("Unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_login_success_roundtrip() {
        let packet = ClientboundPacket::LoginSuccess {
            id: Uuid::from_u128(0xABCD),
            username: "Alice".into(),
        };
        assert_eq!(ClientboundPacket::decode(packet.to_bytes()).unwrap(), packet);
    }
}
