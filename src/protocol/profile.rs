//! Decoding of the signed region of a forwarding payload.
//!
//! ```text
//! [VarInt version] [String address] [UUID id] [String username (<=16)]
//! [VarInt property count] { [String name] [String value] [Bool signed] [String signature]? }*
//! ```
//!
//! Properties are consumed so the cursor ends in the right place, but their
//! contents are dropped.

use crate::core::wire;
use crate::error::{ProtocolError, Result};
use crate::protocol::integrity::{self, ForwardingSecret};
use bytes::{Buf, BufMut, BytesMut};
use std::net::IpAddr;
use uuid::Uuid;

/// Highest forwarding version understood here; also the challenge body
pub const MAX_SUPPORTED_FORWARDING_VERSION: u8 = 4;

/// Maximum characters in a forwarded username
pub const MAX_USERNAME_LEN: usize = 16;

/// Verified player identity carried by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedProfile {
    pub id: Uuid,
    pub username: String,
}

/// Everything recovered from a verified payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedPlayer {
    pub version: u32,
    pub address: IpAddr,
    pub profile: ForwardedProfile,
}

/// A property as written by the gateway. Only used when encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

/// Read the forwarding version, rejecting anything newer than we support
pub fn read_version<B: Buf>(buf: &mut B) -> Result<u32> {
    let version = wire::read_varint(buf)? as u32;
    if version > u32::from(MAX_SUPPORTED_FORWARDING_VERSION) {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Read the player's address as an IP literal
pub fn read_address<B: Buf>(buf: &mut B) -> Result<IpAddr> {
    let raw = wire::read_string(buf)?;
    raw.parse::<IpAddr>()
        .map_err(|_| ProtocolError::InvalidAddress(raw))
}

/// Read the player's id and username
pub fn read_profile<B: Buf>(buf: &mut B) -> Result<ForwardedProfile> {
    let id = wire::read_uuid(buf)?;
    let username = wire::read_bounded_string(buf, MAX_USERNAME_LEN)?;
    Ok(ForwardedProfile { id, username })
}

/// Consume the property list without keeping it. Returns how many were skipped.
pub fn skip_properties<B: Buf>(buf: &mut B) -> Result<usize> {
    let count = wire::read_varint(buf)?;
    if count < 0 {
        return Err(ProtocolError::MalformedInput(format!(
            "Negative property count: {count}"
        )));
    }
    for _ in 0..count {
        wire::read_string(buf)?;
        wire::read_string(buf)?;
        if wire::read_bool(buf)? {
            wire::read_string(buf)?;
        }
    }
    Ok(count as usize)
}

/// Decode a signed region whose tag has already been checked
pub fn decode_forwarded<B: Buf>(buf: &mut B) -> Result<ForwardedPlayer> {
    let version = read_version(buf)?;
    let address = read_address(buf)?;
    let profile = read_profile(buf)?;
    skip_properties(buf)?;
    Ok(ForwardedPlayer {
        version,
        address,
        profile,
    })
}

impl ForwardedPlayer {
    /// Encode the signed region as a gateway would
    pub fn encode(&self, properties: &[ProfileProperty], buf: &mut BytesMut) {
        wire::write_varint(buf, self.version as i32);
        wire::write_string(buf, &self.address.to_string());
        wire::write_uuid(buf, &self.profile.id);
        wire::write_string(buf, &self.profile.username);
        wire::write_varint(buf, properties.len() as i32);
        for property in properties {
            write_property(buf, property);
        }
    }

    /// Encode and sign, producing the payload carried by a plugin response
    pub fn encode_signed(
        &self,
        properties: &[ProfileProperty],
        secret: &ForwardingSecret,
    ) -> Result<Vec<u8>> {
        let mut data = BytesMut::new();
        self.encode(properties, &mut data);
        integrity::sign_payload(&data, secret)
    }
}

/// Append one property entry
pub fn write_property<B: BufMut>(buf: &mut B, property: &ProfileProperty) {
    wire::write_string(buf, &property.name);
    wire::write_string(buf, &property.value);
    wire::write_bool(buf, property.signature.is_some());
    if let Some(signature) = &property.signature {
        wire::write_string(buf, signature);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn alice() -> ForwardedPlayer {
        ForwardedPlayer {
            version: 4,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            profile: ForwardedProfile {
                id: Uuid::nil(),
                username: "Alice".into(),
            },
        }
    }

    #[test]
    fn test_decode_without_properties() {
        let mut buf = BytesMut::new();
        alice().encode(&[], &mut buf);
        let mut bytes = buf.freeze();

        let decoded = decode_forwarded(&mut bytes).unwrap();
        assert_eq!(decoded, alice());
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn test_properties_consumed_to_end() {
        let properties = vec![
            ProfileProperty {
                name: "textures".into(),
                value: "e30=".into(),
                signature: None,
            },
            ProfileProperty {
                name: "cape".into(),
                value: "none".into(),
                signature: None,
            },
        ];
        let mut buf = BytesMut::new();
        alice().encode(&properties, &mut buf);
        let mut bytes = buf.freeze();

        let decoded = decode_forwarded(&mut bytes).unwrap();
        assert_eq!(decoded.profile.username, "Alice");
        assert_eq!(bytes.remaining(), 0);
    }

    #[test]
    fn test_signed_property_skipped() {
        let mut buf = BytesMut::new();
        wire::write_varint(&mut buf, 1);
        write_property(
            &mut buf,
            &ProfileProperty {
                name: "textures".into(),
                value: "e30=".into(),
                signature: Some("c2ln".into()),
            },
        );
        buf.put_u8(0xEE);
        let mut bytes = buf.freeze();

        assert_eq!(skip_properties(&mut bytes).unwrap(), 1);
        assert_eq!(&bytes[..], &[0xEE]);
    }

    #[test]
    fn test_version_above_max_rejected() {
        let mut player = alice();
        player.version = 5;
        let mut buf = BytesMut::new();
        player.encode(&[], &mut buf);

        assert!(matches!(
            decode_forwarded(&mut buf.freeze()),
            Err(ProtocolError::UnsupportedVersion(5))
        ));
    }

    #[test]
    fn test_hostname_is_not_an_address() {
        let mut buf = BytesMut::new();
        wire::write_string(&mut buf, "not an address");
        assert!(matches!(
            read_address(&mut buf.freeze()),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_ipv6_address() {
        let mut buf = BytesMut::new();
        wire::write_string(&mut buf, "::1");
        assert_eq!(
            read_address(&mut buf.freeze()).unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_truncated_property_list() {
        let mut buf = BytesMut::new();
        wire::write_varint(&mut buf, 2);
        write_property(
            &mut buf,
            &ProfileProperty {
                name: "a".into(),
                value: "b".into(),
                signature: None,
            },
        );
        assert!(matches!(
            skip_properties(&mut buf.freeze()),
            Err(ProtocolError::MalformedInput(_))
        ));
    }
}
