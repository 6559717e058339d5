//! Error types for vaultlink.
//!
//! Every variant is a distinct failure mode of the handshake, the envelope
//! codec or the key hierarchy. Messages signal *what* failed without
//! revealing key material, passwords or plaintext.

use thiserror::Error;

/// The single error type for all vaultlink operations.
#[derive(Debug, Error)]
pub enum VaultlinkError {
    /// No key is established yet: the session is not `Ready`, or a key
    /// source is empty.
    #[error("key unavailable")]
    KeyUnavailable,

    /// Key material received or produced during the handshake was malformed
    /// or incompatible. The controller is left in `Failed`.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A wrapped session key arrived after the session was established.
    /// The existing session is kept.
    #[error("session already established")]
    SessionAlreadyEstablished,

    /// Authenticated decryption failed: wrong key, tampered or corrupted
    /// ciphertext, or a corrupted nonce.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Decryption succeeded but the plaintext did not pass structural
    /// validation.
    #[error("decrypted payload failed validation")]
    InvalidDecryptedPayload,

    /// The visibility group has no key held in memory.
    #[error("visibility group is not open")]
    GroupNotOpen,

    /// The supplied password does not match the group's verifier.
    #[error("password verification failed")]
    PasswordVerificationFailed,

    /// The AEAD seal operation failed.
    #[error("encryption failed")]
    EncryptionFailure,

    /// Password-based key derivation or HKDF expansion failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailure(String),

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// A value could not be serialised before encryption.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A persisted visibility group record is structurally invalid.
    #[error("invalid visibility group record: {0}")]
    InvalidGroupRecord(String),

    /// A record's private part would not pass validation when read back, so
    /// it was refused before encryption.
    #[error("invalid {0} record")]
    InvalidRecord(&'static str),

    /// A record was converted with a group other than the one it names.
    #[error("record belongs to a different visibility group")]
    GroupMismatch,

    /// Configuration values are out of range or unparsable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How calling code should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Prompt for the group password again.
    AskPassword,
    /// Throw away the handshake and call `begin_handshake` again.
    RestartHandshake,
    /// The stored or received data cannot be trusted.
    TreatAsCorrupted,
    /// The request itself is wrong; fix the input and do not retry as is.
    RejectInput,
    /// A key has not been established yet; wait for readiness or open the group.
    WaitForKey,
    /// Not recoverable by the caller (bad configuration, broken RNG, programming error).
    Fatal,
}

impl VaultlinkError {
    /// Classify this error into the response a caller should choose.
    pub fn remedy(&self) -> Remedy {
        match self {
            Self::PasswordVerificationFailed => Remedy::AskPassword,
            Self::HandshakeFailed(_) => Remedy::RestartHandshake,
            Self::DecryptionFailed
            | Self::InvalidDecryptedPayload
            | Self::InvalidGroupRecord(_) => Remedy::TreatAsCorrupted,
            Self::SessionAlreadyEstablished | Self::InvalidRecord(_) => Remedy::RejectInput,
            Self::KeyUnavailable | Self::GroupNotOpen => Remedy::WaitForKey,
            Self::EncryptionFailure
            | Self::KeyDerivationFailure(_)
            | Self::RandomnessFailure
            | Self::Serialization(_)
            | Self::GroupMismatch
            | Self::Config(_) => Remedy::Fatal,
        }
    }
}
