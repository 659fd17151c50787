//! Login-phase frame codec.
//!
//! Every packet travels as a length-delimited frame:
//!
//! ```text
//! [VarInt frame length] [VarInt packet id] [fields...]
//! ```
//!
//! The length counts the packet id and fields. Frames whose declared length
//! exceeds [`MAX_FRAME_SIZE`] (2 MiB) are rejected before any body is read,
//! as are length prefixes longer than five bytes. A partial frame leaves the
//! read buffer untouched so the decoder can retry once more bytes arrive.

use crate::core::packet::{ClientboundPacket, ServerboundPacket, WirePacket};
use crate::core::wire::{self, MAX_VARINT_LEN};
use crate::error::{constants, ProtocolError};
use bytes::{Buf, BytesMut};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Largest frame body accepted from the peer (2 MiB)
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Varint-length-prefixed frame codec for login packets.
///
/// ```text
/// [VarInt frame length] [VarInt packet id] [fields...]
/// ```
///
/// `In` is the packet type read from the stream, `Out` the type written.
pub struct FrameCodec<In, Out> {
    _marker: PhantomData<fn() -> (In, Out)>,
}

/// Codec for the proxy side: reads serverbound, writes clientbound
pub type ServerCodec = FrameCodec<ServerboundPacket, ClientboundPacket>;

/// Codec for the gateway side: reads clientbound, writes serverbound
pub type GatewayCodec = FrameCodec<ClientboundPacket, ServerboundPacket>;

impl<In, Out> FrameCodec<In, Out> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for FrameCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

/// Peek the length prefix without consuming it.
///
/// Returns `None` while the prefix itself is still incomplete.
fn peek_length(src: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value: u32 = 0;
    for (i, byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            let len = value as i32;
            if len < 0 {
                return Err(ProtocolError::MalformedInput(
                    constants::ERR_NEGATIVE_LENGTH.into(),
                ));
            }
            return Ok(Some((i + 1, len as usize)));
        }
    }
    if src.len() >= MAX_VARINT_LEN {
        return Err(ProtocolError::MalformedInput(
            constants::ERR_VARINT_TOO_LONG.into(),
        ));
    }
    Ok(None)
}

impl<In: WirePacket, Out> Decoder for FrameCodec<In, Out> {
    type Item = In;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((header_len, body_len)) = peek_length(src)? else {
            return Ok(None);
        };

        if body_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::MalformedInput(format!(
                "{}: {body_len} bytes",
                constants::ERR_FRAME_TOO_LARGE
            )));
        }

        let total = header_len + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let body = src.split_to(body_len).freeze();
        In::decode(body).map(Some)
    }
}

impl<In, Out: WirePacket> Encoder<Out> for FrameCodec<In, Out> {
    type Error = ProtocolError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.to_bytes();
        if body.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::MalformedInput(format!(
                "{}: {} bytes",
                constants::ERR_FRAME_TOO_LARGE,
                body.len()
            )));
        }
        dst.reserve(wire::varint_len(body.len() as i32) + body.len());
        wire::write_varint(dst, body.len() as i32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
