use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use vaultlink::{
    accept_any, Envelope, HandshakeController, HandshakeState, PeerSession, ReadinessEvent,
    Remedy, VaultlinkError, WRAPPED_KEY_LEN,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UnlockRequest {
    group: String,
    attempt: u32,
}

fn established() -> (HandshakeController, PeerSession) {
    let mut host = HandshakeController::new();
    host.begin_handshake().unwrap();

    // Exchange (a): the peer asks for the host key.
    let public = host.serve_public_key().unwrap();
    // Exchange (b): the peer sends its wrapped session key back.
    let (peer, wrapped) = PeerSession::establish(&public).unwrap();
    assert_eq!(wrapped.as_bytes().len(), WRAPPED_KEY_LEN);
    host.complete_handshake(wrapped.as_bytes()).unwrap();

    (host, peer)
}

#[test]
fn test_messages_flow_both_ways() {
    let (host, peer) = established();
    assert!(host.is_ready());
    assert!(peer.is_ready());

    let request = UnlockRequest {
        group: "Finance".into(),
        attempt: 1,
    };
    let sent = peer.encode(&request).unwrap();
    let received = host.decode(&sent, accept_any).unwrap();
    assert_eq!(received, request);

    let reply = host.encode(&"unlocked".to_string()).unwrap();
    assert_eq!(peer.decode(&reply, accept_any).unwrap(), "unlocked");
}

#[test]
fn test_host_cannot_decode_before_ready() {
    let mut host = HandshakeController::new();
    let public = host.begin_handshake().unwrap();
    let (peer, _wrapped) = PeerSession::establish(&public).unwrap();

    // The peer is ready immediately; the host is not until it unwraps.
    let early = peer.encode(&1u32).unwrap();
    assert!(matches!(
        host.decode(&early, accept_any),
        Err(VaultlinkError::KeyUnavailable)
    ));
    assert!(matches!(host.encode(&1u32), Err(VaultlinkError::KeyUnavailable)));
    assert!(matches!(host.session_key(), Err(VaultlinkError::KeyUnavailable)));
}

#[test]
fn test_tampered_wrapped_key_leaves_controller_failed() {
    let mut host = HandshakeController::new();
    let events = Arc::new(Mutex::new(Vec::<ReadinessEvent>::new()));
    let sink = Arc::clone(&events);
    host.on_readiness_changed(move |event: &ReadinessEvent| {
        sink.lock().unwrap().push(event.clone());
    });

    let public = host.begin_handshake().unwrap();
    let (_peer, wrapped) = PeerSession::establish(&public).unwrap();
    let mut tampered = wrapped.into_bytes();
    tampered[40] ^= 0x01;

    let err = host.complete_handshake(&tampered).unwrap_err();
    assert!(matches!(err, VaultlinkError::HandshakeFailed(_)));
    assert_eq!(err.remedy(), Remedy::RestartHandshake);

    assert_eq!(host.state(), HandshakeState::Failed);
    assert!(!host.is_ready());
    assert!(matches!(host.encode(&"x"), Err(VaultlinkError::KeyUnavailable)));

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.previous, HandshakeState::AwaitingPeerPublicKey);
    assert_eq!(last.current, HandshakeState::Failed);
    assert!(!last.ready);
}

#[test]
fn test_failed_handshake_can_be_restarted() {
    let mut host = HandshakeController::new();
    host.begin_handshake().unwrap();
    assert!(host.complete_handshake(b"garbage").is_err());

    // A failed controller needs an explicit restart.
    let public = host.begin_handshake().unwrap();
    let (_stale, stale_wrapped) = PeerSession::establish(&public).unwrap();
    assert!(host.complete_handshake(b"garbage").is_err());
    assert!(host.complete_handshake(stale_wrapped.as_bytes()).is_err());
    assert_eq!(host.state(), HandshakeState::Failed);

    let public = host.begin_handshake().unwrap();
    let (peer, wrapped) = PeerSession::establish(&public).unwrap();
    host.complete_handshake(wrapped.as_bytes()).unwrap();

    let envelope = host.encode(&42u64).unwrap();
    assert_eq!(peer.decode(&envelope, accept_any).unwrap(), 42);
}

#[test]
fn test_every_listener_sees_every_transition() {
    let mut host = HandshakeController::new();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&first);
    host.on_readiness_changed(move |e: &ReadinessEvent| sink.lock().unwrap().push(e.current));
    let sink = Arc::clone(&second);
    let second_id =
        host.on_readiness_changed(move |e: &ReadinessEvent| sink.lock().unwrap().push(e.current));

    let public = host.begin_handshake().unwrap();
    assert!(host.unsubscribe(second_id));

    let (_peer, wrapped) = PeerSession::establish(&public).unwrap();
    host.complete_handshake(wrapped.as_bytes()).unwrap();

    assert_eq!(
        *first.lock().unwrap(),
        vec![HandshakeState::AwaitingPeerPublicKey, HandshakeState::Ready]
    );
    assert_eq!(
        *second.lock().unwrap(),
        vec![HandshakeState::AwaitingPeerPublicKey]
    );
}

#[test]
fn test_message_from_another_session_is_rejected() {
    let (host, _peer) = established();
    let (_other_host, other_peer) = established();

    let foreign = other_peer.encode(&"hello").unwrap();
    let foreign: Envelope<String> = Envelope::new(foreign.ciphertext, foreign.nonce);
    assert!(matches!(
        host.decode(&foreign, accept_any),
        Err(VaultlinkError::DecryptionFailed)
    ));
}
