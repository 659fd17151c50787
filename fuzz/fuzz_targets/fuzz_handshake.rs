#![no_main]

use bytes::{Bytes, BytesMut};
use gateway_forwarding::core::codec::ServerCodec;
use gateway_forwarding::protocol::integrity::{self, ForwardingSecret};
use gateway_forwarding::protocol::profile;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Frame decoding must never panic
    let mut buffer = BytesMut::from(data);
    let mut codec = ServerCodec::new();
    while let Ok(Some(_)) = codec.decode(&mut buffer) {}

    // Neither must verification or decoding of an untrusted payload
    let secret = ForwardingSecret::new(b"fuzz".to_vec());
    let mut payload = Bytes::copy_from_slice(data);
    let _ = integrity::verify(&mut payload, &secret);
    let _ = profile::decode_forwarded(&mut payload);
});
