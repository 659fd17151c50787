//! # Core Protocol Components
//!
//! Low-level wire primitives, login packets and frame codec.
//!
//! ## Components
//! - **Wire**: VarInt, string, UUID, bool and optional-payload primitives
//! - **Packet**: login plugin request/response, dispatched by packet id
//! - **Codec**: Tokio codec for varint-length framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [VarInt length] [VarInt packet id] [fields...]
//! ```
//!
//! ## Security
//! - Maximum frame size: 2MB (prevents memory exhaustion)
//! - Length validation before allocation

pub mod codec;
pub mod packet;
pub mod wire;
