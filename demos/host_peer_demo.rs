//! Minimal example: a host and a presentation peer in one process.
//!
//! Demonstrates the session handshake, an encrypted request from the peer,
//! and a group-protected record stored on the host side.
//! Run with: `RUST_LOG=debug cargo run --example host_peer_demo`

use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vaultlink::records::{DataEntry, EntryField};
use vaultlink::{accept_any, HandshakeController, KeyHierarchy, PeerSession, Record, VaultConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. Handshake
    let mut host = HandshakeController::new();
    host.on_readiness_changed(|event: &vaultlink::ReadinessEvent| {
        println!("host: {:?} -> {:?}", event.previous, event.current);
    });
    host.begin_handshake()?;

    let public = host.serve_public_key()?;
    let (peer, wrapped) = PeerSession::establish(&public)?;
    host.complete_handshake(wrapped.as_bytes())?;

    // 2. The peer asks the host to open a group
    let request = peer.encode(&"open Finance".to_string())?;
    let received: String = host.decode(&request, accept_any)?;
    println!("host received: {received}");

    // 3. Host-side vault
    let mut vault = KeyHierarchy::new(VaultConfig::default())?;
    let password = SecretString::from("correct-horse".to_string());
    let finance = vault.create_group("owner-1", "Finance", &password, None)?;

    let record = Record::Entry(DataEntry {
        id: Uuid::new_v4(),
        storage_id: Uuid::new_v4(),
        box_id: Uuid::new_v4(),
        template_id: Uuid::new_v4(),
        name: "Brokerage".into(),
        fields: vec![EntryField {
            label: "pin".into(),
            value: "4242".into(),
            secret: true,
        }],
    });
    let stored = record.store(Some(&finance), &vault)?;
    println!("persisted: {}", serde_json::to_string(&stored)?);

    vault.close_group(&finance);
    vault.unlock_group(&finance, &password)?;
    assert_eq!(stored.restore(Some(&finance), &vault)?, record);
    println!("restored entry after reopening the group");

    Ok(())
}
