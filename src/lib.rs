//! # vaultlink
//!
//! Trust core of a local secrets-management client.
//!
//! Two subsystems share one set of primitives and one envelope format:
//!
//! - **Session handshake**: a privileged host process and an untrusted
//!   presentation process agree on a symmetric session key via a one-time
//!   X25519 key wrap ([`handshake`]). Every later message travels as an
//!   authenticated [`Envelope`].
//! - **Vault key hierarchy**: password-gated visibility groups each own a
//!   derived key that encrypts group-scoped records at rest ([`vault`],
//!   [`records`]). A separate salted hash verifies the password.
//!
//! ## Public API
//!
//! `crypto` and `keys` are the only modules that touch `ring` or
//! `x25519-dalek`. Raw key bytes never leave the crate.

pub mod config;
pub(crate) mod crypto;
pub mod envelope;
pub mod error;
pub mod handshake;
pub(crate) mod keys;
pub mod records;
pub mod vault;

pub use config::VaultConfig;
pub use crypto::{PUBLIC_KEY_LEN, WRAPPED_KEY_LEN};
pub use envelope::{accept_any, decode, decode_bound, encode, encode_bound, Envelope, KeySource};
pub use error::{Remedy, VaultlinkError};
pub use handshake::{
    HandshakeController, HandshakeState, ListenerId, PeerSession, ReadinessEvent,
    ReadinessListener, WrappedSessionKey,
};
pub use keys::SymmetricKey;
pub use records::{
    from_secured, to_private, to_secured, Record, SecuredKind, SecuredRecord, StoredRecord,
};
pub use vault::{GroupId, KeyHierarchy, VisibilityGroup};

/// Generate a standalone symmetric key.
///
/// Session and group keys are produced by the handshake and the key
/// hierarchy; this is for callers that manage a key themselves.
pub fn generate_key() -> Result<SymmetricKey, VaultlinkError> {
    SymmetricKey::generate()
}
