//! Session handshake between the host and the presentation peer.
//!
//! The host owns an X25519 key pair and a [`HandshakeController`]. The peer
//! imports the host's public key, generates a fresh session key, wraps it
//! and sends it back ([`PeerSession::establish`]). The host unwraps it in
//! [`HandshakeController::complete_handshake`] and becomes `Ready`.
//!
//! ```text
//! Uninitialized -> AwaitingPeerPublicKey -> AwaitingWrappedSessionKey -> Ready
//!                        \___________________________\______________-> Failed
//! ```
//!
//! Readiness transitions are the only observable effect of this module and
//! are multicast to every registered [`ReadinessListener`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::crypto::PUBLIC_KEY_LEN;
use crate::envelope::{self, Envelope, KeySource};
use crate::error::VaultlinkError;
use crate::keys::{HostKeyPair, PeerPublicKey, SymmetricKey};

/// The host-side handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeState {
    /// No key pair has been exported yet.
    Uninitialized,
    /// The public key is exported and waiting to be fetched by the peer.
    AwaitingPeerPublicKey,
    /// The peer has fetched the public key; waiting for its wrapped session key.
    AwaitingWrappedSessionKey,
    /// A session key is established.
    Ready,
    /// The last exchange failed. A new `begin_handshake` is required.
    Failed,
}

/// A single state transition, delivered to every listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessEvent {
    pub previous: HandshakeState,
    pub current: HandshakeState,
    /// Whether the controller is `Ready` after this transition.
    pub ready: bool,
    pub at: DateTime<Utc>,
}

/// Receives readiness transitions. Implemented for any `FnMut(&ReadinessEvent)`.
pub trait ReadinessListener: Send {
    fn on_transition(&mut self, event: &ReadinessEvent);
}

impl<F> ReadinessListener for F
where
    F: FnMut(&ReadinessEvent) + Send,
{
    fn on_transition(&mut self, event: &ReadinessEvent) {
        self(event)
    }
}

/// Handle returned by [`HandshakeController::on_readiness_changed`].
///
/// Handles come from a counter and are never reused within one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Host-side handshake state machine. Exclusively owns the session key.
pub struct HandshakeController {
    state: HandshakeState,
    key_pair: Option<HostKeyPair>,
    session_key: Option<SymmetricKey>,
    listeners: Vec<(ListenerId, Box<dyn ReadinessListener>)>,
    next_listener_id: u64,
}

impl std::fmt::Debug for HandshakeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeController")
            .field("state", &self.state)
            .field("has_key_pair", &self.key_pair.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for HandshakeController {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeController {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Uninitialized,
            key_pair: None,
            session_key: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Current state. Always synchronous.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether a session key is established.
    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// The exported public key, once a key pair exists.
    pub fn public_key(&self) -> Option<[u8; PUBLIC_KEY_LEN]> {
        self.key_pair.as_ref().map(HostKeyPair::export_public)
    }

    /// The session key, or `KeyUnavailable` unless `Ready`.
    pub fn session_key(&self) -> Result<&SymmetricKey, VaultlinkError> {
        self.session_key.as_ref().ok_or(VaultlinkError::KeyUnavailable)
    }

    /// Start (or restart) the handshake and export the host public key.
    ///
    /// The key pair is generated on the first call and reused afterwards.
    /// When already `Ready` this changes nothing and returns the same key.
    pub fn begin_handshake(&mut self) -> Result<[u8; PUBLIC_KEY_LEN], VaultlinkError> {
        if self.state == HandshakeState::Ready {
            if let Some(public) = self.public_key() {
                return Ok(public);
            }
        }

        let public = if let Some(pair) = &self.key_pair {
            pair.export_public()
        } else {
            let pair = match HostKeyPair::generate() {
                Ok(pair) => pair,
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            };
            debug!("generated host key pair");
            self.key_pair.insert(pair).export_public()
        };

        self.session_key = None;
        self.transition(HandshakeState::AwaitingPeerPublicKey);
        Ok(public)
    }

    /// Answer the peer's request for the host public key.
    pub fn serve_public_key(&mut self) -> Result<[u8; PUBLIC_KEY_LEN], VaultlinkError> {
        let public = match (self.state, self.public_key()) {
            (
                HandshakeState::AwaitingPeerPublicKey
                | HandshakeState::AwaitingWrappedSessionKey
                | HandshakeState::Ready,
                Some(public),
            ) => public,
            _ => {
                return Err(VaultlinkError::HandshakeFailed(
                    "handshake has not been started".into(),
                ))
            }
        };

        if self.state == HandshakeState::AwaitingPeerPublicKey {
            self.transition(HandshakeState::AwaitingWrappedSessionKey);
        }
        Ok(public)
    }

    /// Unwrap the peer's session key and become `Ready`.
    ///
    /// Any failure moves the controller to `Failed` with no session key held.
    /// A controller that is already `Ready` rejects the call with
    /// `SessionAlreadyEstablished` and keeps its session.
    pub fn complete_handshake(&mut self, wrapped: &[u8]) -> Result<(), VaultlinkError> {
        if self.state == HandshakeState::Ready {
            warn!("rejected wrapped key: session already established");
            return Err(VaultlinkError::SessionAlreadyEstablished);
        }

        let unwrapped = match (self.state, &self.key_pair) {
            (
                HandshakeState::AwaitingPeerPublicKey | HandshakeState::AwaitingWrappedSessionKey,
                Some(pair),
            ) => pair.unwrap_session_key(wrapped),
            _ => Err(VaultlinkError::HandshakeFailed(
                "handshake is not in progress".into(),
            )),
        };

        match unwrapped {
            Ok(key) => {
                self.session_key = Some(key);
                self.transition(HandshakeState::Ready);
                info!("session handshake completed");
                Ok(())
            }
            Err(e) => {
                let e = match e {
                    VaultlinkError::HandshakeFailed(_) => e,
                    other => VaultlinkError::HandshakeFailed(other.to_string()),
                };
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Register a listener for every future state transition.
    pub fn on_readiness_changed<L>(&mut self, listener: L) -> ListenerId
    where
        L: ReadinessListener + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        debug!(listener = id.0, "readiness listener registered");
        id
    }

    /// Remove a listener. Returns `false` if the id is unknown.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Encrypt a message for the peer. Requires `Ready`.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Envelope<T>, VaultlinkError> {
        envelope::encode(value, self)
    }

    /// Decrypt and validate a message from the peer. Requires `Ready`.
    pub fn decode<T, F>(&self, envelope: &Envelope<T>, is_valid: F) -> Result<T, VaultlinkError>
    where
        T: DeserializeOwned,
        F: FnOnce(&Value) -> bool,
    {
        envelope::decode(envelope, self, is_valid)
    }

    fn fail(&mut self, error: &VaultlinkError) {
        self.session_key = None;
        warn!(%error, "session handshake failed");
        self.transition(HandshakeState::Failed);
    }

    fn transition(&mut self, next: HandshakeState) {
        if self.state == next {
            return;
        }
        let event = ReadinessEvent {
            previous: self.state,
            current: next,
            ready: next == HandshakeState::Ready,
            at: Utc::now(),
        };
        self.state = next;
        debug!(from = ?event.previous, to = ?event.current, "handshake transition");

        for (_, listener) in self.listeners.iter_mut() {
            listener.on_transition(&event);
        }
    }
}

impl KeySource for HandshakeController {
    fn current_key(&self) -> Option<&SymmetricKey> {
        if self.is_ready() {
            self.session_key.as_ref()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Peer side
// ---------------------------------------------------------------------------

/// A session key wrapped for the host, ready to be sent over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedSessionKey(Vec<u8>);

impl WrappedSessionKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// The peer's half of an established session.
///
/// The peer is ready as soon as its key is generated and wrapped; it never
/// waits for the host to acknowledge.
#[derive(Debug)]
pub struct PeerSession {
    session_key: SymmetricKey,
}

impl PeerSession {
    /// Import the host public key, generate a session key and wrap it.
    pub fn establish(
        host_public_key: &[u8],
    ) -> Result<(Self, WrappedSessionKey), VaultlinkError> {
        let host = PeerPublicKey::from_bytes(host_public_key)?;
        let session_key = SymmetricKey::generate()?;
        let wrapped = host.wrap(&session_key)?;

        info!("peer session key generated");
        Ok((Self { session_key }, WrappedSessionKey(wrapped)))
    }

    pub fn is_ready(&self) -> bool {
        true
    }

    /// Encrypt a message for the host.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Envelope<T>, VaultlinkError> {
        envelope::encode(value, self)
    }

    /// Decrypt and validate a message from the host.
    pub fn decode<T, F>(&self, envelope: &Envelope<T>, is_valid: F) -> Result<T, VaultlinkError>
    where
        T: DeserializeOwned,
        F: FnOnce(&Value) -> bool,
    {
        envelope::decode(envelope, self, is_valid)
    }
}

impl KeySource for PeerSession {
    fn current_key(&self) -> Option<&SymmetricKey> {
        Some(&self.session_key)
    }
}
