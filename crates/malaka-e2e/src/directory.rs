//! Public key directory shapes.
//!
//! The messaging service keeps one published public key per user and
//! device. Clients upload a [`PublicKeyUpload`] and read peers back as
//! [`DirectoryEntry`] values. Nothing here touches private material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::jwk::{import_public, PublicKeyMaterial};
use crate::key_storage::KeyPairRecord;
use crate::keys::{compute_fingerprint, PublicKey};

/// Device label used when the caller does not supply one.
pub const DEFAULT_DEVICE_LABEL: &str = "default";

/// Body of a public key upsert request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyUpload {
    pub public_key_jwk: PublicKeyMaterial,
    pub key_fingerprint: String,
    #[serde(default = "default_device_label")]
    pub device_label: String,
}

fn default_device_label() -> String {
    DEFAULT_DEVICE_LABEL.to_string()
}

impl PublicKeyUpload {
    /// Build an upload for the public half of `record`.
    ///
    /// An empty or missing label becomes [`DEFAULT_DEVICE_LABEL`].
    pub fn from_record(record: &KeyPairRecord, device_label: Option<&str>) -> Self {
        let device_label = device_label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map_or_else(default_device_label, str::to_string);
        Self {
            public_key_jwk: record.public_key.to_public(),
            key_fingerprint: record.fingerprint.clone(),
            device_label,
        }
    }
}

/// A published public key as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub user_id: String,
    pub public_key_jwk: PublicKeyMaterial,
    pub key_fingerprint: String,
    #[serde(default = "default_device_label")]
    pub device_label: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DirectoryEntry {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Import the entry's key after checking it is usable.
    ///
    /// # Errors
    ///
    /// [`E2eError::InvalidKeyMaterial`] if the entry is revoked, the JWK
    /// is malformed, or the advertised fingerprint does not match it.
    pub fn verified_public_key(&self) -> E2eResult<PublicKey> {
        if let Some(revoked_at) = self.revoked_at {
            return Err(E2eError::InvalidKeyMaterial(format!(
                "directory key {} was revoked at {}",
                self.id,
                revoked_at.to_rfc3339()
            )));
        }
        let public = import_public(&self.public_key_jwk)?;
        let actual = compute_fingerprint(&public);
        if !actual.eq_ignore_ascii_case(&self.key_fingerprint) {
            return Err(E2eError::InvalidKeyMaterial(format!(
                "directory key {} fingerprint mismatch",
                self.id
            )));
        }
        Ok(public)
    }
}
