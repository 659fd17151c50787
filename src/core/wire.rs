//! # Wire Primitives
//!
//! Readers and writers for the primitive types carried by login packets.
//!
//! ## Formats
//! ```text
//! VarInt   : 1-5 bytes, 7 bits per byte, least significant group first, 0x80 = continue
//! String   : [VarInt byte length] [UTF-8 bytes]
//! UUID     : [u64 most significant] [u64 least significant], big-endian
//! Bool     : 1 byte, non-zero = true
//! Optional : [Bool present] [all remaining bytes]
//! ```
//!
//! Every reader checks `remaining()` before touching the buffer, so a short
//! buffer yields `MalformedInput` rather than a panic from `bytes`.

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes};
use uuid::Uuid;

/// Maximum number of bytes in an encoded VarInt
pub const MAX_VARINT_LEN: usize = 5;

/// Worst-case UTF-8 width used to bound string byte lengths before allocating
const MAX_UTF8_WIDTH: usize = 4;

/// Read a VarInt. The wire form is the unsigned 32-bit pattern of the value.
pub fn read_varint<B: Buf>(buf: &mut B) -> Result<i32> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(ProtocolError::exhausted());
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtocolError::MalformedInput(
        constants::ERR_VARINT_TOO_LONG.into(),
    ))
}

/// Write a VarInt
pub fn write_varint<B: BufMut>(buf: &mut B, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

/// Number of bytes `write_varint` produces for `value`
pub fn varint_len(value: i32) -> usize {
    let value = value as u32;
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

/// Read a length-prefixed string with no character bound
pub fn read_string<B: Buf>(buf: &mut B) -> Result<String> {
    read_string_inner(buf, None)
}

/// Read a length-prefixed string of at most `max_chars` characters
pub fn read_bounded_string<B: Buf>(buf: &mut B, max_chars: usize) -> Result<String> {
    read_string_inner(buf, Some(max_chars))
}

fn read_string_inner<B: Buf>(buf: &mut B, max_chars: Option<usize>) -> Result<String> {
    let len = read_varint(buf)?;
    if len < 0 {
        return Err(ProtocolError::MalformedInput(
            constants::ERR_NEGATIVE_LENGTH.into(),
        ));
    }
    let len = len as usize;

    if let Some(max) = max_chars {
        if len > max * MAX_UTF8_WIDTH {
            return Err(ProtocolError::ProtocolViolation(format!(
                "String byte length {len} exceeds bound for {max} characters"
            )));
        }
    }
    if buf.remaining() < len {
        return Err(ProtocolError::exhausted());
    }

    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    let value = String::from_utf8(raw)
        .map_err(|_| ProtocolError::MalformedInput(constants::ERR_INVALID_UTF8.into()))?;

    if let Some(max) = max_chars {
        let chars = value.chars().count();
        if chars > max {
            return Err(ProtocolError::ProtocolViolation(format!(
                "String length {chars} exceeds maximum of {max}"
            )));
        }
    }
    Ok(value)
}

/// Write a length-prefixed string
pub fn write_string<B: BufMut>(buf: &mut B, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.put_slice(value.as_bytes());
}

/// Read a 128-bit identifier, high half first
pub fn read_uuid<B: Buf>(buf: &mut B) -> Result<Uuid> {
    if buf.remaining() < 16 {
        return Err(ProtocolError::exhausted());
    }
    let high = buf.get_u64();
    let low = buf.get_u64();
    Ok(Uuid::from_u64_pair(high, low))
}

/// Write a 128-bit identifier, high half first
pub fn write_uuid<B: BufMut>(buf: &mut B, id: &Uuid) {
    let (high, low) = id.as_u64_pair();
    buf.put_u64(high);
    buf.put_u64(low);
}

/// Read a boolean byte
pub fn read_bool<B: Buf>(buf: &mut B) -> Result<bool> {
    if !buf.has_remaining() {
        return Err(ProtocolError::exhausted());
    }
    Ok(buf.get_u8() != 0)
}

/// Write a boolean byte
pub fn write_bool<B: BufMut>(buf: &mut B, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Read an optional trailing payload.
///
/// `None` means the presence flag was false. `Some` with an empty `Bytes` means
/// the flag was true and nothing followed; the two are not interchangeable.
pub fn read_optional_payload<B: Buf>(buf: &mut B) -> Result<Option<Bytes>> {
    if read_bool(buf)? {
        let len = buf.remaining();
        Ok(Some(buf.copy_to_bytes(len)))
    } else {
        Ok(None)
    }
}

/// Write an optional trailing payload
pub fn write_optional_payload<B: BufMut>(buf: &mut B, payload: Option<&[u8]>) {
    write_bool(buf, payload.is_some());
    if let Some(data) = payload {
        buf.put_slice(data);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint_known_encodings() {
        let cases: [(i32, &[u8]); 6] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (25565, &[0xDD, 0xC7, 0x01]),
            (-1, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];
        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(&buf[..], expected, "encoding {value}");
            assert_eq!(varint_len(value), expected.len());

            let mut slice = expected;
            assert_eq!(read_varint(&mut slice).unwrap(), value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_varint_rejects_six_groups() {
        let mut slice: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&mut slice),
            Err(ProtocolError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_varint_truncated() {
        let mut slice: &[u8] = &[0x80, 0x80];
        assert!(matches!(
            read_varint(&mut slice),
            Err(ProtocolError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_bounded_string() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Alice");
        let mut slice = &buf[..];
        assert_eq!(read_bounded_string(&mut slice, 16).unwrap(), "Alice");

        let mut buf = BytesMut::new();
        write_string(&mut buf, "ThisNameIsWayTooLong");
        let mut slice = &buf[..];
        assert!(matches!(
            read_bounded_string(&mut slice, 16),
            Err(ProtocolError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_bound_counts_characters_not_bytes() {
        // 16 two-byte characters: 32 bytes, still within a 16 character bound
        let name: String = std::iter::repeat('é').take(16).collect();
        let mut buf = BytesMut::new();
        write_string(&mut buf, &name);
        let mut slice = &buf[..];
        assert_eq!(read_bounded_string(&mut slice, 16).unwrap(), name);
    }

    #[test]
    fn test_string_length_overrun() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 10);
        buf.put_slice(b"abc");
        let mut slice = &buf[..];
        assert!(matches!(
            read_string(&mut slice),
            Err(ProtocolError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_uuid_layout() {
        let id = Uuid::from_u64_pair(0x0102_0304_0506_0708, 0x090A_0B0C_0D0E_0F10);
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, &id);
        assert_eq!(&buf[..], &(1u8..=16).collect::<Vec<_>>()[..]);

        let mut slice = &buf[..];
        assert_eq!(read_uuid(&mut slice).unwrap(), id);

        let mut short: &[u8] = &[0u8; 15];
        assert!(read_uuid(&mut short).is_err());
    }

    #[test]
    fn test_optional_payload_absent_vs_empty() {
        let mut absent: &[u8] = &[0x00];
        assert_eq!(read_optional_payload(&mut absent).unwrap(), None);

        let mut empty: &[u8] = &[0x01];
        assert_eq!(
            read_optional_payload(&mut empty).unwrap(),
            Some(Bytes::new())
        );

        let mut present: &[u8] = &[0x01, 0xAA, 0xBB];
        assert_eq!(
            read_optional_payload(&mut present).unwrap(),
            Some(Bytes::from_static(&[0xAA, 0xBB]))
        );
        assert!(present.is_empty());

        let mut missing: &[u8] = &[];
        assert!(read_optional_payload(&mut missing).is_err());
    }
}
