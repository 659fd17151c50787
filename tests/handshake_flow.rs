//! End-to-end handshake tests through the channel-backed connection

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use bytes::Bytes;
use gateway_forwarding::config::ForwardingConfig;
use gateway_forwarding::core::packet::{ClientboundPacket, LoginPluginResponse};
use gateway_forwarding::protocol::connection::PlayerConnection;
use gateway_forwarding::protocol::handshake::{
    ForwardingHandshake, HandshakeOutcome, PLAYER_INFO_CHANNEL,
};
use gateway_forwarding::protocol::integrity::ForwardingSecret;
use gateway_forwarding::protocol::profile::{ForwardedPlayer, ForwardedProfile};
use gateway_forwarding::service::ChannelConnection;
use gateway_forwarding::utils::Metrics;
use gateway_forwarding::ProtocolError;
use std::io::Write;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

const SECRET: &[u8] = b"integration-secret";

fn player() -> ForwardedPlayer {
    ForwardedPlayer {
        version: 4,
        address: IpAddr::V6(Ipv6Addr::LOCALHOST),
        profile: ForwardedProfile {
            id: Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef),
            username: "Steve".into(),
        },
    }
}

fn challenge_id(rx: &mut Receiver<ClientboundPacket>) -> i32 {
    match rx.try_recv().expect("challenge queued") {
        ClientboundPacket::PluginRequest(req) => {
            assert_eq!(req.channel, PLAYER_INFO_CHANNEL);
            req.transaction_id
        }
        other => panic!("Expected plugin request, got {other:?}"),
    }
}

fn disconnect_text(packet: ClientboundPacket) -> String {
    match packet {
        ClientboundPacket::Disconnect { reason } => {
            let value: serde_json::Value = serde_json::from_str(&reason).unwrap();
            value["text"].as_str().unwrap().to_string()
        }
        other => panic!("Expected disconnect, got {other:?}"),
    }
}

#[test]
fn test_secret_file_flow() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "integration-").unwrap();
    writeln!(file, "secret").unwrap();

    let config = ForwardingConfig::with_secret_file(true, file.path());
    config.warm_secret().unwrap();
    let handshake = ForwardingHandshake::new(config);

    let (conn, mut rx) = ChannelConnection::new(4);
    assert!(handshake.begin(&conn, "steve", Uuid::nil()).unwrap());
    let id = challenge_id(&mut rx);

    let payload = player()
        .encode_signed(&[], &ForwardingSecret::new(SECRET.to_vec()))
        .unwrap();
    let outcome = handshake.handle_response(
        &conn,
        LoginPluginResponse {
            transaction_id: id,
            payload: Some(Bytes::from(payload)),
        },
    );

    assert!(outcome.is_resumed());
    assert_eq!(conn.profile(), Some(player().profile));
    assert_eq!(
        rx.try_recv().unwrap(),
        ClientboundPacket::LoginSuccess {
            id: player().profile.id,
            username: "Steve".into(),
        }
    );
    assert!(!conn.is_closed());
}

#[test]
fn test_wrong_secret_disconnects() {
    let handshake = ForwardingHandshake::new(ForwardingConfig::with_secret(
        true,
        ForwardingSecret::new(SECRET.to_vec()),
    ));
    let (conn, mut rx) = ChannelConnection::new(4);
    handshake.begin(&conn, "steve", Uuid::nil()).unwrap();
    let id = challenge_id(&mut rx);

    let forged = player()
        .encode_signed(&[], &ForwardingSecret::new(b"not-the-secret".to_vec()))
        .unwrap();
    let outcome = handshake.handle_response(
        &conn,
        LoginPluginResponse {
            transaction_id: id,
            payload: Some(forged.into()),
        },
    );

    assert!(matches!(
        outcome,
        HandshakeOutcome::Rejected(ProtocolError::SecurityViolation(_))
    ));
    assert!(conn.is_closed());
    assert!(conn.profile().is_none());
    assert_eq!(
        disconnect_text(rx.try_recv().unwrap()),
        "Unable to verify player details."
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_disconnect_is_sent_once() {
    let (conn, mut rx) = ChannelConnection::new(4);
    conn.disconnect("first");
    conn.disconnect("second");

    assert_eq!(disconnect_text(rx.try_recv().unwrap()), "first");
    assert!(rx.try_recv().is_err());
    assert!(matches!(
        conn.send_packet(ClientboundPacket::disconnect("late")),
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[test]
fn test_full_queue_fails_begin_and_leaves_slot_empty() {
    let handshake = ForwardingHandshake::new(ForwardingConfig::with_secret(
        true,
        ForwardingSecret::new(SECRET.to_vec()),
    ));
    let (conn, _rx) = ChannelConnection::new(1);
    conn.send_packet(ClientboundPacket::disconnect("filler"))
        .unwrap();

    assert!(handshake.begin(&conn, "steve", Uuid::nil()).is_err());
    assert!(conn.forwarding_slot().take().is_none());
}

#[test]
fn test_shared_metrics_across_connections() {
    let metrics = Arc::new(Metrics::new());
    let handshake = ForwardingHandshake::new(ForwardingConfig::with_secret(
        false,
        ForwardingSecret::new(SECRET.to_vec()),
    ))
    .with_metrics(Arc::clone(&metrics));

    for i in 0..3 {
        let (conn, mut rx) = ChannelConnection::new(4);
        handshake
            .begin(&conn, &format!("player{i}"), Uuid::from_u128(i))
            .unwrap();
        let id = challenge_id(&mut rx);
        let payload = if i == 0 {
            Some(Bytes::from(
                player()
                    .encode_signed(&[], &ForwardingSecret::new(SECRET.to_vec()))
                    .unwrap(),
            ))
        } else {
            None
        };
        handshake.handle_response(
            &conn,
            LoginPluginResponse {
                transaction_id: id,
                payload,
            },
        );
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.handshakes_started, 3);
    assert_eq!(snapshot.resumed_forwarded, 1);
    assert_eq!(snapshot.resumed_fallback, 2);
    assert_eq!(snapshot.rejected_total(), 0);
}

#[test]
fn test_concurrent_connections_are_independent() {
    let handshake = Arc::new(ForwardingHandshake::new(ForwardingConfig::with_secret(
        true,
        ForwardingSecret::new(SECRET.to_vec()),
    )));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let handshake = Arc::clone(&handshake);
            std::thread::spawn(move || {
                let (conn, mut rx) = ChannelConnection::new(4);
                handshake.begin(&conn, "steve", Uuid::nil()).unwrap();
                let id = challenge_id(&mut rx);
                let payload = player()
                    .encode_signed(&[], &ForwardingSecret::new(SECRET.to_vec()))
                    .unwrap();
                handshake
                    .handle_response(
                        &conn,
                        LoginPluginResponse {
                            transaction_id: id,
                            payload: Some(payload.into()),
                        },
                    )
                    .is_resumed()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(handshake.metrics().snapshot().resumed_forwarded, 8);
}

#[test]
fn test_unqueued_login_success_closes_connection() {
    let handshake = ForwardingHandshake::new(ForwardingConfig::with_secret(
        true,
        ForwardingSecret::new(SECRET.to_vec()),
    ));
    // Room for the challenge only; it is never drained
    let (conn, mut rx) = ChannelConnection::new(1);
    handshake.begin(&conn, "steve", Uuid::nil()).unwrap();
    let state = conn.forwarding_slot().take().unwrap();
    conn.forwarding_slot().store(state.clone());

    let payload = player()
        .encode_signed(&[], &ForwardingSecret::new(SECRET.to_vec()))
        .unwrap();
    let outcome = handshake.handle_response(
        &conn,
        LoginPluginResponse {
            transaction_id: state.transaction_id(),
            payload: Some(payload.into()),
        },
    );

    assert!(matches!(
        outcome,
        HandshakeOutcome::Rejected(ProtocolError::Io(_))
    ));
    assert!(conn.is_closed());
    assert!(conn.profile().is_none());
    assert!(matches!(
        rx.try_recv().unwrap(),
        ClientboundPacket::PluginRequest(_)
    ));
    assert!(rx.try_recv().is_err());
    assert_eq!(handshake.metrics().snapshot().resumed_forwarded, 0);
}
