//! Visibility groups and the vault key hierarchy.
//!
//! A visibility group is a password-protected namespace. Its record carries
//! only a password verifier and a key derivation salt; the group's
//! encryption key is re-derived from the password whenever the group is
//! opened and is held by [`KeyHierarchy`] until the group is closed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VaultConfig;
use crate::crypto::{self, KEY_LEN, SALT_LEN};
use crate::envelope::{self, Envelope};
use crate::error::VaultlinkError;
use crate::keys::{self, SymmetricKey};

/// A unique identifier for a visibility group.
pub type GroupId = Uuid;

/// Salted password hash used only to confirm a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordVerifier {
    pub hash: Vec<u8>,
    pub hash_salt: Vec<u8>,
}

/// The persisted form of a visibility group. Contains no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityGroup {
    pub id: GroupId,
    pub owner_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub password_verifier: PasswordVerifier,
    pub key_derivation_salt: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl VisibilityGroup {
    fn check_shape(&self) -> Result<(), VaultlinkError> {
        if self.password_verifier.hash.len() != KEY_LEN {
            return Err(VaultlinkError::InvalidGroupRecord("verifier hash length".into()));
        }
        if self.password_verifier.hash_salt.len() != SALT_LEN {
            return Err(VaultlinkError::InvalidGroupRecord("hash salt length".into()));
        }
        if self.key_derivation_salt.len() != SALT_LEN {
            return Err(VaultlinkError::InvalidGroupRecord(
                "key derivation salt length".into(),
            ));
        }
        Ok(())
    }
}

/// Holds the derived keys of every open group in this process.
pub struct KeyHierarchy {
    config: VaultConfig,
    open: HashMap<GroupId, SymmetricKey>,
}

impl std::fmt::Debug for KeyHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHierarchy")
            .field("config", &self.config)
            .field("open_groups", &self.open.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyHierarchy {
    pub fn new(config: VaultConfig) -> Result<Self, VaultlinkError> {
        config.validate()?;
        Ok(Self {
            config,
            open: HashMap::new(),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Create a group and leave it open.
    ///
    /// Two independent salts are generated: one for the verifier hash, one
    /// for the encryption key. The returned record is safe to persist.
    pub fn create_group(
        &mut self,
        owner_id: &str,
        name: &str,
        password: &SecretString,
        description: Option<&str>,
    ) -> Result<VisibilityGroup, VaultlinkError> {
        let secret = password.expose_secret().as_bytes();

        let hash_salt = crypto::generate_salt()?;
        let key_derivation_salt = crypto::generate_salt()?;
        let hash = keys::hash_password(secret, &hash_salt, &self.config)?;
        let key = keys::derive_group_key(secret, &key_derivation_salt, &self.config)?;

        let group = VisibilityGroup {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            password_verifier: PasswordVerifier {
                hash: hash.to_vec(),
                hash_salt: hash_salt.to_vec(),
            },
            key_derivation_salt: key_derivation_salt.to_vec(),
            created_at: Utc::now(),
        };

        self.open.insert(group.id, key);
        info!(group = %group.id, "visibility group created");
        Ok(group)
    }

    /// Check a password without deriving or holding any key.
    pub fn verify_password(
        &self,
        group: &VisibilityGroup,
        password: &SecretString,
    ) -> Result<bool, VaultlinkError> {
        group.check_shape()?;
        keys::verify_password(
            password.expose_secret().as_bytes(),
            &group.password_verifier.hash_salt,
            &group.password_verifier.hash,
            &self.config,
        )
    }

    /// Open a group if `password` matches its verifier.
    ///
    /// Returns `Ok(false)` on mismatch. A failed attempt leaves the group
    /// closed, discarding any key previously held for it.
    pub fn open_group(
        &mut self,
        group: &VisibilityGroup,
        password: &SecretString,
    ) -> Result<bool, VaultlinkError> {
        if !self.verify_password(group, password)? {
            self.open.remove(&group.id);
            warn!(group = %group.id, "password verification failed");
            return Ok(false);
        }

        let key = keys::derive_group_key(
            password.expose_secret().as_bytes(),
            &group.key_derivation_salt,
            &self.config,
        )?;
        self.open.insert(group.id, key);
        info!(group = %group.id, "visibility group opened");
        Ok(true)
    }

    /// Like [`open_group`](Self::open_group), but a mismatch is an error.
    pub fn unlock_group(
        &mut self,
        group: &VisibilityGroup,
        password: &SecretString,
    ) -> Result<(), VaultlinkError> {
        if self.open_group(group, password)? {
            Ok(())
        } else {
            Err(VaultlinkError::PasswordVerificationFailed)
        }
    }

    /// Discard the group's key. Returns `true` if it was open.
    pub fn close_group(&mut self, group: &VisibilityGroup) -> bool {
        let was_open = self.open.remove(&group.id).is_some();
        if was_open {
            info!(group = %group.id, "visibility group closed");
        }
        was_open
    }

    /// Discard every held group key.
    pub fn close_all(&mut self) {
        let count = self.open.len();
        self.open.clear();
        debug!(count, "closed all visibility groups");
    }

    pub fn is_open(&self, group: &VisibilityGroup) -> bool {
        self.open.contains_key(&group.id)
    }

    pub fn open_group_count(&self) -> usize {
        self.open.len()
    }

    fn group_key(&self, group: &VisibilityGroup) -> Result<&SymmetricKey, VaultlinkError> {
        self.open.get(&group.id).ok_or(VaultlinkError::GroupNotOpen)
    }

    /// Encrypt a value under an open group's key.
    pub fn encrypt_for_group<T: Serialize>(
        &self,
        value: &T,
        group: &VisibilityGroup,
    ) -> Result<Envelope<T>, VaultlinkError> {
        self.encrypt_for_group_bound(value, group, &[])
    }

    /// Encrypt under an open group's key with `context` authenticated
    /// alongside the ciphertext.
    pub fn encrypt_for_group_bound<T: Serialize>(
        &self,
        value: &T,
        group: &VisibilityGroup,
        context: &[u8],
    ) -> Result<Envelope<T>, VaultlinkError> {
        envelope::encode_bound(value, self.group_key(group)?, context)
    }

    /// Decrypt and validate a value under an open group's key.
    pub fn decrypt_for_group<T, F>(
        &self,
        envelope: &Envelope<T>,
        group: &VisibilityGroup,
        is_valid: F,
    ) -> Result<T, VaultlinkError>
    where
        T: DeserializeOwned,
        F: FnOnce(&Value) -> bool,
    {
        self.decrypt_for_group_bound(envelope, group, &[], is_valid)
    }

    /// Decrypt a value produced by
    /// [`encrypt_for_group_bound`](Self::encrypt_for_group_bound).
    pub fn decrypt_for_group_bound<T, F>(
        &self,
        envelope: &Envelope<T>,
        group: &VisibilityGroup,
        context: &[u8],
        is_valid: F,
    ) -> Result<T, VaultlinkError>
    where
        T: DeserializeOwned,
        F: FnOnce(&Value) -> bool,
    {
        envelope::decode_bound(envelope, self.group_key(group)?, context, is_valid)
    }
}
