//! Key ownership and derivation.
//!
//! This module owns three responsibilities:
//! 1. Holding key material in types that are opaque, non-cloneable and
//!    zeroised on drop (`SymmetricKey`, `HostKeyPair`).
//! 2. Deriving the session-key wrapping key from an X25519 shared secret
//!    (HKDF-SHA256).
//! 3. The two independent password derivations of a visibility group:
//!
//! ```text
//! verifier  = PBKDF2-HMAC-SHA256(password, hash_salt, pbkdf2_iterations)
//! group key = Argon2id(password, key_derivation_salt, m, t, p)
//! ```
//!
//! Different algorithms and different salts: holding the verifier gives no
//! shortcut to the group key.

use std::num::NonZeroU32;

use ring::{hkdf, pbkdf2};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::VaultConfig;
use crate::crypto::{self, KEY_LEN, PUBLIC_KEY_LEN};
use crate::error::VaultlinkError;

/// HKDF info string binding wrapping keys to this protocol version.
const WRAP_INFO: &[u8] = b"vaultlink/session-wrap/v1";

// ---------------------------------------------------------------------------
// Symmetric key
// ---------------------------------------------------------------------------

/// A 256-bit AES-256-GCM key: a session key or an open group's key.
///
/// - Not `Clone`. Each key has exactly one owner.
/// - Zeroised on drop.
/// - Raw bytes are `pub(crate)` and never leave the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Construct a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random key.
    pub fn generate() -> Result<Self, VaultlinkError> {
        Ok(Self::from_bytes(crypto::generate_random_key()?))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Asymmetric keys
// ---------------------------------------------------------------------------

/// The host's X25519 key pair. The secret half never leaves this struct.
pub struct HostKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl HostKeyPair {
    /// Generate a new key pair from the system CSPRNG.
    pub fn generate() -> Result<Self, VaultlinkError> {
        let secret = crypto::generate_x25519_secret()?;
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Export the public half in its portable 32-byte form.
    pub fn export_public(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }

    /// Unwrap a session key that a peer wrapped for this key pair.
    pub fn unwrap_session_key(&self, wrapped: &[u8]) -> Result<SymmetricKey, VaultlinkError> {
        let bytes = crypto::unwrap_key(&self.secret, wrapped)?;
        Ok(SymmetricKey::from_bytes(*bytes))
    }
}

impl std::fmt::Debug for HostKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKeyPair")
            .field("public", &self.public.as_bytes())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A host public key imported on the peer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerPublicKey(PublicKey);

impl PeerPublicKey {
    /// Import a public key from its exported byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultlinkError> {
        let array: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultlinkError::HandshakeFailed(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(PublicKey::from(array)))
    }

    /// Wrap `key` so that only the matching host secret can recover it.
    pub fn wrap(&self, key: &SymmetricKey) -> Result<Vec<u8>, VaultlinkError> {
        crypto::wrap_key(&self.0, key.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive the AES key that wraps a session key.
///
/// ```text
/// HKDF-SHA256(
///     ikm  = X25519 shared secret,
///     salt = ephemeral_public || recipient_public,
///     info = "vaultlink/session-wrap/v1"
/// )
/// ```
pub(crate) fn derive_wrapping_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; PUBLIC_KEY_LEN],
    recipient_public: &[u8; PUBLIC_KEY_LEN],
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultlinkError> {
    let mut salt_bytes = [0u8; PUBLIC_KEY_LEN * 2];
    salt_bytes[..PUBLIC_KEY_LEN].copy_from_slice(ephemeral_public);
    salt_bytes[PUBLIC_KEY_LEN..].copy_from_slice(recipient_public);

    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &salt_bytes);
    let prk = salt.extract(shared_secret);

    let info = [WRAP_INFO];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultlinkError::KeyDerivationFailure("HKDF expand".into()))?;

    let mut derived = Zeroizing::new([0u8; KEY_LEN]);
    okm.fill(derived.as_mut())
        .map_err(|_| VaultlinkError::KeyDerivationFailure("HKDF fill".into()))?;
    Ok(derived)
}

/// Derive a group's encryption key from its password with Argon2id.
pub(crate) fn derive_group_key(
    password: &[u8],
    key_derivation_salt: &[u8],
    config: &VaultConfig,
) -> Result<SymmetricKey, VaultlinkError> {
    let params = argon2::Params::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultlinkError::KeyDerivationFailure(format!("Argon2id parameters: {e}")))?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, key_derivation_salt, output.as_mut())
        .map_err(|e| VaultlinkError::KeyDerivationFailure(format!("Argon2id: {e}")))?;

    Ok(SymmetricKey::from_bytes(*output))
}

fn pbkdf2_iterations(config: &VaultConfig) -> Result<NonZeroU32, VaultlinkError> {
    NonZeroU32::new(config.pbkdf2_iterations)
        .ok_or_else(|| VaultlinkError::Config("pbkdf2_iterations must be non-zero".into()))
}

/// Compute the password verifier hash.
pub(crate) fn hash_password(
    password: &[u8],
    hash_salt: &[u8],
    config: &VaultConfig,
) -> Result<[u8; KEY_LEN], VaultlinkError> {
    let mut hash = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        pbkdf2_iterations(config)?,
        hash_salt,
        password,
        &mut hash,
    );
    Ok(hash)
}

/// Check `password` against a stored verifier in constant time.
pub(crate) fn verify_password(
    password: &[u8],
    hash_salt: &[u8],
    expected_hash: &[u8],
    config: &VaultConfig,
) -> Result<bool, VaultlinkError> {
    Ok(pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        pbkdf2_iterations(config)?,
        hash_salt,
        password,
        expected_hash,
    )
    .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> VaultConfig {
        VaultConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            pbkdf2_iterations: 1_000,
        }
    }

    #[test]
    fn test_group_key_is_deterministic_per_salt() {
        let cfg = fast_config();
        let a = derive_group_key(b"pw", &[1u8; 16], &cfg).unwrap();
        let b = derive_group_key(b"pw", &[1u8; 16], &cfg).unwrap();
        let c = derive_group_key(b"pw", &[2u8; 16], &cfg).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn test_verifier_and_group_key_differ_for_same_salt() {
        let cfg = fast_config();
        let salt = [7u8; 16];
        let hash = hash_password(b"pw", &salt, &cfg).unwrap();
        let key = derive_group_key(b"pw", &salt, &cfg).unwrap();
        assert_ne!(&hash, key.as_bytes());
    }

    #[test]
    fn test_verify_password() {
        let cfg = fast_config();
        let salt = [3u8; 16];
        let hash = hash_password(b"correct", &salt, &cfg).unwrap();
        assert!(verify_password(b"correct", &salt, &hash, &cfg).unwrap());
        assert!(!verify_password(b"incorrect", &salt, &hash, &cfg).unwrap());
        assert!(!verify_password(b"correct", &[4u8; 16], &hash, &cfg).unwrap());
    }

    #[test]
    fn test_zero_pbkdf2_iterations_is_a_config_error() {
        let cfg = VaultConfig {
            pbkdf2_iterations: 0,
            ..fast_config()
        };
        assert!(matches!(
            hash_password(b"pw", &[0u8; 16], &cfg),
            Err(VaultlinkError::Config(_))
        ));
    }

    #[test]
    fn test_peer_public_key_import_checks_length() {
        assert!(PeerPublicKey::from_bytes(&[9u8; 31]).is_err());
        let pair = HostKeyPair::generate().unwrap();
        assert!(PeerPublicKey::from_bytes(&pair.export_public()).is_ok());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "SymmetricKey([REDACTED])");
        let pair = HostKeyPair::generate().unwrap();
        assert!(format!("{pair:?}").contains("[REDACTED]"));
    }
}
