//! HMAC-SHA256 integrity check for forwarded player data.
//!
//! A signed payload is `[32-byte tag] [signed region]`, where the tag is
//! HMAC-SHA256 over the signed region keyed with the shared forwarding secret.
//!
//! # Security Properties
//!
//! - Tag comparison is constant-time (`subtle::ConstantTimeEq`)
//! - Secret bytes are zeroed on drop and never printed by `Debug`

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, Bytes};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::fs;
use std::path::Path;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Length of the HMAC-SHA256 tag at the front of a signed payload
pub const SIGNATURE_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Pre-shared key material used to authenticate the upstream gateway
pub struct ForwardingSecret {
    key: Vec<u8>,
}

impl ForwardingSecret {
    /// Wrap raw key bytes
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Load a secret file.
    ///
    /// All lines are concatenated with their terminators removed and the
    /// result is used as UTF-8 key bytes. An empty result is an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut content = fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigurationFault(format!(
                "Failed to read forwarding secret from {}: {e}",
                path.display()
            ))
        })?;

        let mut joined: String = content.lines().collect();
        content.zeroize();
        if joined.is_empty() {
            return Err(ProtocolError::ConfigurationFault(
                constants::ERR_SECRET_EMPTY.into(),
            ));
        }

        let secret = Self::new(joined.as_bytes());
        joined.zeroize();
        Ok(secret)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| ProtocolError::ConfigurationFault(format!("Invalid HMAC key: {e}")))
    }
}

impl Drop for ForwardingSecret {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for ForwardingSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingSecret")
            .field("key", &"<redacted>")
            .field("len", &self.key.len())
            .finish()
    }
}

/// Compute the tag for `data`
pub fn sign(data: &[u8], secret: &ForwardingSecret) -> Result<[u8; SIGNATURE_LEN]> {
    let mut mac = secret.mac()?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Prefix `data` with its tag, producing a complete signed payload
pub fn sign_payload(data: &[u8], secret: &ForwardingSecret) -> Result<Vec<u8>> {
    let tag = sign(data, secret)?;
    let mut out = Vec::with_capacity(SIGNATURE_LEN + data.len());
    out.extend_from_slice(&tag);
    out.extend_from_slice(data);
    Ok(out)
}

/// Check the tag at the front of `buf` against the bytes after it.
///
/// On return the cursor sits at the first byte of the signed region whether
/// or not the tag matched. Fails with `MalformedInput` when fewer than
/// [`SIGNATURE_LEN`] bytes are available.
pub fn verify(buf: &mut Bytes, secret: &ForwardingSecret) -> Result<bool> {
    if buf.remaining() < SIGNATURE_LEN {
        return Err(ProtocolError::exhausted());
    }
    let mut signature = [0u8; SIGNATURE_LEN];
    buf.copy_to_slice(&mut signature);

    let computed = sign(buf, secret)?;
    Ok(computed[..].ct_eq(&signature[..]).into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn secret() -> ForwardingSecret {
        ForwardingSecret::new(b"0123456789abcdef".to_vec())
    }

    #[test]
    fn test_valid_signature_leaves_cursor_at_data() {
        let secret = secret();
        let data = b"player data";
        let mut buf = Bytes::from(sign_payload(data, &secret).unwrap());

        assert!(verify(&mut buf, &secret).unwrap());
        assert_eq!(&buf[..], data);
    }

    #[test]
    fn test_mismatch_still_advances_cursor() {
        let secret = secret();
        let mut payload = sign_payload(b"player data", &secret).unwrap();
        payload[0] ^= 0x01;
        let mut buf = Bytes::from(payload);

        assert!(!verify(&mut buf, &secret).unwrap());
        assert_eq!(&buf[..], b"player data");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = sign_payload(b"player data", &secret()).unwrap();
        let other = ForwardingSecret::new(b"another secret".to_vec());
        assert!(!verify(&mut Bytes::from(payload), &other).unwrap());
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let secret = ForwardingSecret::new(b"Jefe".to_vec());
        let tag = sign(b"what do ya want for nothing?", &secret).unwrap();
        assert_eq!(
            tag[..4],
            [0x5b, 0xdc, 0xc1, 0x46],
            "HMAC-SHA256 prefix should match RFC 4231"
        );
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let mut buf = Bytes::from_static(&[0u8; 31]);
        assert!(matches!(
            verify(&mut buf, &secret()),
            Err(ProtocolError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let rendered = format!("{:?}", secret());
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("redacted"));
    }
}
