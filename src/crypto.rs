//! Low-level cryptographic operations.
//!
//! This module and `keys` are the only places in the crate that touch `ring`
//! or `x25519-dalek` directly. Every other module encrypts, decrypts, wraps
//! and unwraps exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//! - **Key wrap**: ephemeral X25519 agreement, HKDF-SHA256, AES-256-GCM
//!
//! # Layout of a wrapped session key
//! ```text
//! [ ephemeral public (32) ][ nonce (12) ][ key ciphertext (32) + GCM tag (16) ]
//! ```

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::VaultlinkError;
use crate::keys;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of a password salt in bytes.
pub const SALT_LEN: usize = 16;

/// Size of an exported X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Size of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Exact size of a wrapped session key on the wire.
pub const WRAPPED_KEY_LEN: usize = PUBLIC_KEY_LEN + NONCE_LEN + KEY_LEN + TAG_LEN;

/// Fill `buf` from the system CSPRNG, the only randomness source in the crate.
fn fill_random(buf: &mut [u8]) -> Result<(), VaultlinkError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| VaultlinkError::RandomnessFailure)
}

fn aead_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey, VaultlinkError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key_bytes)
        .map_err(|_| VaultlinkError::KeyDerivationFailure("invalid AES-256-GCM key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt a plaintext payload using AES-256-GCM and a fresh random nonce.
///
/// `aad` is authenticated but not encrypted; the same bytes must be supplied
/// to [`open`]. Returns `(ciphertext_with_tag, nonce)`.
pub fn seal(
    key_bytes: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), VaultlinkError> {
    let key = aead_key(key_bytes)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| VaultlinkError::EncryptionFailure)?;

    Ok((in_out, nonce_bytes))
}

/// Decrypt a ciphertext produced by [`seal`].
///
/// A wrong key, a tampered ciphertext, a corrupted nonce or mismatched `aad`
/// all fail the GCM tag check. The caller receives no partial plaintext.
pub fn open(
    key_bytes: &[u8; KEY_LEN],
    nonce_bytes: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, VaultlinkError> {
    if ciphertext.len() < TAG_LEN {
        return Err(VaultlinkError::DecryptionFailed);
    }

    let key = aead_key(key_bytes)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(*nonce_bytes),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| VaultlinkError::DecryptionFailed)?;

    Ok(plaintext.to_vec())
}

/// Generate a cryptographically secure random 256-bit key.
pub fn generate_random_key() -> Result<[u8; KEY_LEN], VaultlinkError> {
    let mut key = [0u8; KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}

/// Generate a random salt for password hashing or key derivation.
pub fn generate_salt() -> Result<[u8; SALT_LEN], VaultlinkError> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    Ok(salt)
}

/// Generate an X25519 secret from `SystemRandom` bytes.
pub(crate) fn generate_x25519_secret() -> Result<StaticSecret, VaultlinkError> {
    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    fill_random(bytes.as_mut())?;
    Ok(StaticSecret::from(*bytes))
}

/// Wrap a symmetric key for the holder of `recipient`'s secret.
///
/// A fresh ephemeral X25519 secret is used for every call, so wrapping the
/// same key twice yields unrelated outputs.
pub fn wrap_key(
    recipient: &PublicKey,
    key_bytes: &[u8; KEY_LEN],
) -> Result<Vec<u8>, VaultlinkError> {
    let ephemeral = generate_x25519_secret()?;
    let ephemeral_public = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(VaultlinkError::HandshakeFailed(
            "recipient public key is a low-order point".into(),
        ));
    }

    let kek = keys::derive_wrapping_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient.as_bytes(),
    )?;
    let (ciphertext, nonce) = seal(&kek, key_bytes, &[])?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_LEN);
    wrapped.extend_from_slice(ephemeral_public.as_bytes());
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&ciphertext);
    Ok(wrapped)
}

/// Unwrap a key produced by [`wrap_key`] using the recipient's secret.
///
/// Every failure (length, low-order point, authentication) is reported as
/// `HandshakeFailed`; no partial key is ever returned.
pub fn unwrap_key(
    secret: &StaticSecret,
    wrapped: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultlinkError> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(VaultlinkError::HandshakeFailed(format!(
            "wrapped key must be {} bytes, got {}",
            WRAPPED_KEY_LEN,
            wrapped.len()
        )));
    }

    let (ephemeral_bytes, rest) = wrapped.split_at(PUBLIC_KEY_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral_bytes: [u8; PUBLIC_KEY_LEN] = ephemeral_bytes
        .try_into()
        .map_err(|_| VaultlinkError::HandshakeFailed("malformed ephemeral key".into()))?;
    let nonce: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| VaultlinkError::HandshakeFailed("malformed nonce".into()))?;
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(VaultlinkError::HandshakeFailed(
            "ephemeral public key is a low-order point".into(),
        ));
    }

    let recipient_public = PublicKey::from(secret);
    let kek = keys::derive_wrapping_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient_public.as_bytes(),
    )?;

    let plaintext = Zeroizing::new(open(&kek, &nonce, ciphertext, &[]).map_err(|_| {
        VaultlinkError::HandshakeFailed("wrapped key failed authentication".into())
    })?);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    if plaintext.len() != KEY_LEN {
        return Err(VaultlinkError::HandshakeFailed("unwrapped key has wrong length".into()));
    }
    key.copy_from_slice(&plaintext);
    Ok(key)
}
