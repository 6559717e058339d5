//! Secured record converters.
//!
//! Every protected entity is split into a public identity (ids used for
//! indexing and lookup, never encrypted) and a private part that is sealed
//! in an [`Envelope`] under the key of an open visibility group.
//!
//! ```text
//! { <public identity fields>, "encrypted_private": { "ciphertext": .., "nonce": .. } }
//! ```
//!
//! Records are never patched in place: an update is a full replace and
//! re-encrypt through [`to_secured`].
//!
//! The serialised public identity is authenticated with the private part,
//! so an `encrypted_private` moved under another record's identity fails
//! to decrypt.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::VaultlinkError;
use crate::vault::{GroupId, KeyHierarchy, VisibilityGroup};

/// An entity kind with a public identity and an encrypted private part.
pub trait SecuredKind: Sized {
    /// Short kind name, used in errors and in the authenticated context.
    const KIND: &'static str;

    type Public: Serialize + DeserializeOwned + Clone;
    type Private: Serialize + DeserializeOwned;

    /// The identity fields kept in cleartext.
    fn public(&self) -> Self::Public;

    /// The sensitive fields, stripped of identity.
    fn to_private(&self) -> Self::Private;

    /// Rebuild the full record from both halves.
    fn join(public: Self::Public, private: Self::Private) -> Self;

    /// Structural check applied to decrypted private data before use.
    fn is_valid_private(value: &Value) -> bool;

    /// Whether this record may be sealed under `group`.
    fn accepts_group(_public: &Self::Public, _group: &VisibilityGroup) -> bool {
        true
    }
}

/// A record as persisted: public identity plus encrypted private fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: DeserializeOwned"))]
pub struct SecuredRecord<P, T> {
    #[serde(flatten)]
    pub public: P,
    pub encrypted_private: Envelope<T>,
}

/// Strip the public identity, keeping only sensitive content.
pub fn to_private<R: SecuredKind>(record: &R) -> R::Private {
    record.to_private()
}

/// The bytes authenticated alongside a record's private part: the kind name
/// followed by the serialised public identity.
pub fn identity_context<R: SecuredKind>(public: &R::Public) -> Result<Vec<u8>, VaultlinkError> {
    let mut context = format!("vaultlink/record/{}:", R::KIND).into_bytes();
    serde_json::to_writer(&mut context, public)
        .map_err(|e| VaultlinkError::Serialization(e.to_string()))?;
    Ok(context)
}

/// Encrypt the private part under `group` and reattach the public identity.
///
/// The private part must pass the same validation [`from_secured`] applies,
/// otherwise nothing is encrypted and `InvalidRecord` is returned.
pub fn to_secured<R: SecuredKind>(
    record: &R,
    group: &VisibilityGroup,
    vault: &KeyHierarchy,
) -> Result<SecuredRecord<R::Public, R::Private>, VaultlinkError> {
    let public = record.public();
    if !R::accepts_group(&public, group) {
        return Err(VaultlinkError::GroupMismatch);
    }

    let private = record.to_private();
    let shape = serde_json::to_value(&private)
        .map_err(|e| VaultlinkError::Serialization(e.to_string()))?;
    if !R::is_valid_private(&shape) {
        debug!(kind = R::KIND, "refused to seal invalid record");
        return Err(VaultlinkError::InvalidRecord(R::KIND));
    }

    let context = identity_context::<R>(&public)?;
    let encrypted_private = vault.encrypt_for_group_bound(&private, group, &context)?;
    Ok(SecuredRecord {
        public,
        encrypted_private,
    })
}

/// Decrypt and validate the private part, then rebuild the record.
pub fn from_secured<R: SecuredKind>(
    secured: &SecuredRecord<R::Public, R::Private>,
    group: &VisibilityGroup,
    vault: &KeyHierarchy,
) -> Result<R, VaultlinkError> {
    if !R::accepts_group(&secured.public, group) {
        return Err(VaultlinkError::GroupMismatch);
    }
    let context = identity_context::<R>(&secured.public)?;
    let private = vault.decrypt_for_group_bound(
        &secured.encrypted_private,
        group,
        &context,
        R::is_valid_private,
    )?;
    Ok(R::join(secured.public.clone(), private))
}

fn non_empty_str(value: &Value, field: &str) -> bool {
    value
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn optional_str(value: &Value, field: &str) -> bool {
    match value.get(field) {
        None | Some(Value::Null) => true,
        Some(v) => v.is_string(),
    }
}

// ---------------------------------------------------------------------------
// Storage configuration
// ---------------------------------------------------------------------------

/// Where a storage keeps its blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
    Local {
        path: String,
    },
    Remote {
        endpoint: String,
        username: String,
        access_token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub id: Uuid,
    pub owner_id: String,
    /// `None` stores the configuration without a confidentiality layer.
    pub visibility_group_id: Option<GroupId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePublic {
    pub id: Uuid,
    pub owner_id: String,
    pub visibility_group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePrivate {
    pub name: String,
    pub description: Option<String>,
    pub backend: StorageBackend,
}

pub type SecuredStorageConfig = SecuredRecord<StoragePublic, StoragePrivate>;

impl SecuredKind for StorageConfig {
    const KIND: &'static str = "storage";

    type Public = StoragePublic;
    type Private = StoragePrivate;

    fn public(&self) -> StoragePublic {
        StoragePublic {
            id: self.id,
            owner_id: self.owner_id.clone(),
            visibility_group_id: self.visibility_group_id,
        }
    }

    fn to_private(&self) -> StoragePrivate {
        StoragePrivate {
            name: self.name.clone(),
            description: self.description.clone(),
            backend: self.backend.clone(),
        }
    }

    fn join(public: StoragePublic, private: StoragePrivate) -> Self {
        Self {
            id: public.id,
            owner_id: public.owner_id,
            visibility_group_id: public.visibility_group_id,
            name: private.name,
            description: private.description,
            backend: private.backend,
        }
    }

    fn is_valid_private(value: &Value) -> bool {
        if !non_empty_str(value, "name") || !optional_str(value, "description") {
            return false;
        }
        let Some(backend) = value.get("backend") else {
            return false;
        };
        match backend.get("type").and_then(Value::as_str) {
            Some("local") => non_empty_str(backend, "path"),
            Some("remote") => {
                non_empty_str(backend, "endpoint")
                    && backend.get("username").is_some_and(Value::is_string)
                    && backend.get("access_token").is_some_and(Value::is_string)
            }
            _ => false,
        }
    }

    fn accepts_group(public: &StoragePublic, group: &VisibilityGroup) -> bool {
        public.visibility_group_id == Some(group.id)
    }
}

// ---------------------------------------------------------------------------
// Data box configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBoxConfig {
    pub id: Uuid,
    pub storage_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBoxPublic {
    pub id: Uuid,
    pub storage_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBoxPrivate {
    pub name: String,
    pub description: Option<String>,
}

pub type SecuredDataBoxConfig = SecuredRecord<DataBoxPublic, DataBoxPrivate>;

impl SecuredKind for DataBoxConfig {
    const KIND: &'static str = "data_box";

    type Public = DataBoxPublic;
    type Private = DataBoxPrivate;

    fn public(&self) -> DataBoxPublic {
        DataBoxPublic {
            id: self.id,
            storage_id: self.storage_id,
        }
    }

    fn to_private(&self) -> DataBoxPrivate {
        DataBoxPrivate {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    fn join(public: DataBoxPublic, private: DataBoxPrivate) -> Self {
        Self {
            id: public.id,
            storage_id: public.storage_id,
            name: private.name,
            description: private.description,
        }
    }

    fn is_valid_private(value: &Value) -> bool {
        non_empty_str(value, "name") && optional_str(value, "description")
    }
}

// ---------------------------------------------------------------------------
// Data entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryField {
    pub label: String,
    pub value: String,
    /// Masked by the presentation layer.
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub id: Uuid,
    pub storage_id: Uuid,
    pub box_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub fields: Vec<EntryField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntryPublic {
    pub id: Uuid,
    pub storage_id: Uuid,
    pub box_id: Uuid,
    pub template_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntryPrivate {
    pub name: String,
    pub fields: Vec<EntryField>,
}

pub type SecuredDataEntry = SecuredRecord<DataEntryPublic, DataEntryPrivate>;

impl SecuredKind for DataEntry {
    const KIND: &'static str = "entry";

    type Public = DataEntryPublic;
    type Private = DataEntryPrivate;

    fn public(&self) -> DataEntryPublic {
        DataEntryPublic {
            id: self.id,
            storage_id: self.storage_id,
            box_id: self.box_id,
            template_id: self.template_id,
        }
    }

    fn to_private(&self) -> DataEntryPrivate {
        DataEntryPrivate {
            name: self.name.clone(),
            fields: self.fields.clone(),
        }
    }

    fn join(public: DataEntryPublic, private: DataEntryPrivate) -> Self {
        Self {
            id: public.id,
            storage_id: public.storage_id,
            box_id: public.box_id,
            template_id: public.template_id,
            name: private.name,
            fields: private.fields,
        }
    }

    fn is_valid_private(value: &Value) -> bool {
        if !non_empty_str(value, "name") {
            return false;
        }
        let Some(fields) = value.get("fields").and_then(Value::as_array) else {
            return false;
        };
        fields.iter().all(|field| {
            field.get("label").is_some_and(Value::is_string)
                && field.get("value").is_some_and(Value::is_string)
                && field.get("secret").map_or(true, Value::is_boolean)
        })
    }
}

// ---------------------------------------------------------------------------
// Tagged dispatch
// ---------------------------------------------------------------------------

/// A decrypted record of any protected kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Storage(StorageConfig),
    DataBox(DataBoxConfig),
    Entry(DataEntry),
}

/// A record of any kind in its persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredRecord {
    /// A storage configuration with no visibility group.
    PlainStorage(StorageConfig),
    Storage(SecuredStorageConfig),
    DataBox(SecuredDataBoxConfig),
    Entry(SecuredDataEntry),
}

impl Record {
    /// Convert to the persisted form.
    ///
    /// Ungrouped storage configs are stored as-is and must not be given a
    /// group. Every other record needs the group whose key protects it.
    pub fn store(
        &self,
        group: Option<&VisibilityGroup>,
        vault: &KeyHierarchy,
    ) -> Result<StoredRecord, VaultlinkError> {
        match (self, group) {
            (Record::Storage(config), None) if config.visibility_group_id.is_none() => {
                Ok(StoredRecord::PlainStorage(config.clone()))
            }
            (Record::Storage(config), Some(_)) if config.visibility_group_id.is_none() => {
                Err(VaultlinkError::GroupMismatch)
            }
            (Record::Storage(config), Some(group)) => {
                to_secured(config, group, vault).map(StoredRecord::Storage)
            }
            (Record::DataBox(config), Some(group)) => {
                to_secured(config, group, vault).map(StoredRecord::DataBox)
            }
            (Record::Entry(entry), Some(group)) => {
                to_secured(entry, group, vault).map(StoredRecord::Entry)
            }
            (_, None) => Err(VaultlinkError::GroupNotOpen),
        }
    }
}

impl StoredRecord {
    /// Rebuild the decrypted record. All-or-nothing.
    pub fn restore(
        &self,
        group: Option<&VisibilityGroup>,
        vault: &KeyHierarchy,
    ) -> Result<Record, VaultlinkError> {
        match (self, group) {
            (StoredRecord::PlainStorage(config), None) => Ok(Record::Storage(config.clone())),
            (StoredRecord::PlainStorage(_), Some(_)) => Err(VaultlinkError::GroupMismatch),
            (StoredRecord::Storage(secured), Some(group)) => {
                from_secured(secured, group, vault).map(Record::Storage)
            }
            (StoredRecord::DataBox(secured), Some(group)) => {
                from_secured(secured, group, vault).map(Record::DataBox)
            }
            (StoredRecord::Entry(secured), Some(group)) => {
                from_secured(secured, group, vault).map(Record::Entry)
            }
            (_, None) => Err(VaultlinkError::GroupNotOpen),
        }
    }

    /// The record's own id, readable without any key.
    pub fn id(&self) -> Uuid {
        match self {
            StoredRecord::PlainStorage(config) => config.id,
            StoredRecord::Storage(secured) => secured.public.id,
            StoredRecord::DataBox(secured) => secured.public.id,
            StoredRecord::Entry(secured) => secured.public.id,
        }
    }
}
