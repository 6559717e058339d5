//! Encrypted envelope codec.
//!
//! An [`Envelope<T>`] is the unit of protected data, both between host and
//! peer and at rest in the vault. Encoding serialises the value to JSON and
//! seals it under a fresh nonce. Decoding authenticates, parses, and runs a
//! structural validator before anything is handed back to the caller.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::crypto::{self, NONCE_LEN};
use crate::error::VaultlinkError;
use crate::keys::SymmetricKey;

/// Anything that may or may not currently hold a symmetric key.
pub trait KeySource {
    /// The key to encrypt or decrypt with, if one is established.
    fn current_key(&self) -> Option<&SymmetricKey>;
}

impl KeySource for SymmetricKey {
    fn current_key(&self) -> Option<&SymmetricKey> {
        Some(self)
    }
}

impl KeySource for Option<SymmetricKey> {
    fn current_key(&self) -> Option<&SymmetricKey> {
        self.as_ref()
    }
}

/// Ciphertext plus the nonce that produced it, typed by the plaintext `T`.
///
/// Consumers outside this crate treat the pair as opaque.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Envelope<T> {
    /// AES-256-GCM ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// The 96-bit nonce used for this encryption only.
    pub nonce: Vec<u8>,
    #[serde(skip)]
    _payload: PhantomData<fn() -> T>,
}

impl<T> Envelope<T> {
    /// Reassemble an envelope from its persisted parts.
    pub fn new(ciphertext: Vec<u8>, nonce: Vec<u8>) -> Self {
        Self {
            ciphertext,
            nonce,
            _payload: PhantomData,
        }
    }
}

impl<T> Clone for Envelope<T> {
    fn clone(&self) -> Self {
        Self::new(self.ciphertext.clone(), self.nonce.clone())
    }
}

impl<T> PartialEq for Envelope<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ciphertext == other.ciphertext && self.nonce == other.nonce
    }
}

impl<T> Eq for Envelope<T> {}

impl<T> fmt::Debug for Envelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Validator that accepts every well-formed JSON value.
pub fn accept_any(_: &Value) -> bool {
    true
}

/// Serialise `value` and encrypt it under the key held by `keys`.
pub fn encode<T, K>(value: &T, keys: &K) -> Result<Envelope<T>, VaultlinkError>
where
    T: Serialize,
    K: KeySource + ?Sized,
{
    encode_bound(value, keys, &[])
}

/// Like [`encode`], with `context` authenticated alongside the ciphertext.
///
/// The envelope only opens through [`decode_bound`] with the same context.
/// The context itself is not stored in the envelope.
pub fn encode_bound<T, K>(
    value: &T,
    keys: &K,
    context: &[u8],
) -> Result<Envelope<T>, VaultlinkError>
where
    T: Serialize,
    K: KeySource + ?Sized,
{
    let key = keys.current_key().ok_or(VaultlinkError::KeyUnavailable)?;

    let plaintext = Zeroizing::new(
        serde_json::to_vec(value).map_err(|e| VaultlinkError::Serialization(e.to_string()))?,
    );
    let (ciphertext, nonce) = crypto::seal(key.as_bytes(), &plaintext, context)?;

    Ok(Envelope::new(ciphertext, nonce.to_vec()))
}

/// Decrypt, parse and validate an envelope.
///
/// `is_valid` always runs on the decrypted value before it is converted to
/// `T`. A value that decrypts but fails validation or typed conversion is
/// reported as `InvalidDecryptedPayload` and never returned.
pub fn decode<T, K, F>(envelope: &Envelope<T>, keys: &K, is_valid: F) -> Result<T, VaultlinkError>
where
    T: DeserializeOwned,
    K: KeySource + ?Sized,
    F: FnOnce(&Value) -> bool,
{
    decode_bound(envelope, keys, &[], is_valid)
}

/// Like [`decode`] for envelopes produced by [`encode_bound`].
///
/// A context that differs from the one used at encode time fails the tag
/// check and is reported as `DecryptionFailed`.
pub fn decode_bound<T, K, F>(
    envelope: &Envelope<T>,
    keys: &K,
    context: &[u8],
    is_valid: F,
) -> Result<T, VaultlinkError>
where
    T: DeserializeOwned,
    K: KeySource + ?Sized,
    F: FnOnce(&Value) -> bool,
{
    let key = keys.current_key().ok_or(VaultlinkError::KeyUnavailable)?;

    let nonce: [u8; NONCE_LEN] = envelope
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| VaultlinkError::DecryptionFailed)?;
    let plaintext = Zeroizing::new(crypto::open(
        key.as_bytes(),
        &nonce,
        &envelope.ciphertext,
        context,
    )?);

    let value: Value =
        serde_json::from_slice(&plaintext).map_err(|_| VaultlinkError::InvalidDecryptedPayload)?;
    if !is_valid(&value) {
        tracing::debug!("decrypted payload rejected by validator");
        return Err(VaultlinkError::InvalidDecryptedPayload);
    }

    serde_json::from_value(value).map_err(|_| VaultlinkError::InvalidDecryptedPayload)
}
