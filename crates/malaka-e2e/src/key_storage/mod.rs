//! Durable per-user key pair storage.
//!
//! Each user owns a [`KeyHistory`]: an append-only list of
//! [`KeyPairRecord`]s numbered by generation. The newest record is the
//! current identity. Storing a new key pair supersedes the current one
//! but keeps older generations, so messages encrypted under a retired
//! key can still be opened.
//!
//! Callers choose the lifecycle explicitly:
//!
//! - [`KeyStorage::ensure`] reuses the current key pair, generating one
//!   only on first use
//! - [`KeyStorage::rotate`] always generates a new generation
//!
//! Backends implement [`KeyStore`]: [`MemoryKeyStore`] for tests and
//! embedding, [`FileKeyStore`] for persistence across restarts.
//!
//! Writes through one [`KeyStorage`] are serialized. Separate handles on
//! the same backend (other processes) are last-writer-wins; backends
//! guarantee only that a reader never observes a torn document.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{E2eError, E2eResult};
use crate::jwk::{
    export_private, export_public, import_private, import_public, PrivateKeyMaterial,
    PublicKeyMaterial,
};
use crate::keys::{compute_fingerprint, KeyPair};
use crate::logging;
use crate::provider::CryptoProvider;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;

/// One stored key pair generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairRecord {
    /// Opaque user identifier; the storage key.
    pub user_id: String,
    /// 1-based generation number within the user's history.
    pub generation: u32,
    /// Public half, safe to publish.
    pub public_key: PublicKeyMaterial,
    /// Private half. Never leaves the local store.
    pub private_key: PrivateKeyMaterial,
    /// SHA-256 fingerprint of the public key.
    pub fingerprint: String,
    /// Creation time, informational only.
    pub created_at: DateTime<Utc>,
}

impl KeyPairRecord {
    /// Build a record for `key_pair`, stamped with the current time.
    pub fn new(user_id: &str, generation: u32, key_pair: &KeyPair) -> Self {
        Self {
            user_id: user_id.to_string(),
            generation,
            public_key: export_public(&key_pair.public),
            private_key: export_private(&key_pair.private),
            fingerprint: compute_fingerprint(&key_pair.public),
            created_at: Utc::now(),
        }
    }

    /// Decode the stored material back into a usable key pair.
    ///
    /// Validates both JWKs, that they describe the same key, and that the
    /// stored fingerprint still matches the public key.
    pub fn key_pair(&self) -> E2eResult<KeyPair> {
        let private = import_private(&self.private_key)?;
        let public = import_public(&self.public_key)?;
        if private.public_key() != public {
            return Err(E2eError::InvalidKeyMaterial(format!(
                "stored key halves disagree for user {} generation {}",
                self.user_id, self.generation
            )));
        }
        if compute_fingerprint(&public) != self.fingerprint {
            return Err(E2eError::InvalidKeyMaterial(format!(
                "stored fingerprint mismatch for user {} generation {}",
                self.user_id, self.generation
            )));
        }
        Ok(KeyPair::from_private(private))
    }
}

/// All key pair generations stored for one user, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHistory {
    /// Owner of every record in this history.
    pub user_id: String,
    /// Records in ascending generation order.
    pub records: Vec<KeyPairRecord>,
}

impl KeyHistory {
    /// Empty history for `user_id`.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            records: Vec::new(),
        }
    }

    /// The current (newest) record.
    pub fn current(&self) -> Option<&KeyPairRecord> {
        self.records.last()
    }

    /// Look up a specific generation.
    pub fn generation(&self, generation: u32) -> Option<&KeyPairRecord> {
        self.records.iter().find(|r| r.generation == generation)
    }

    /// Generation number the next stored record receives.
    pub fn next_generation(&self) -> u32 {
        self.current().map_or(1, |r| r.generation + 1)
    }

    /// Append `key_pair` as the new current generation.
    pub fn push(&mut self, key_pair: &KeyPair) -> &KeyPairRecord {
        let record = KeyPairRecord::new(&self.user_id, self.next_generation(), key_pair);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }
}

/// Durable storage backend keyed by user id.
///
/// Not-found is `Ok(None)`; only genuine I/O or decoding failures are
/// [`E2eError::StorageUnavailable`].
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Load a user's full history.
    async fn load_history(&self, user_id: &str) -> E2eResult<Option<KeyHistory>>;

    /// Atomically replace a user's full history.
    async fn save_history(&self, history: &KeyHistory) -> E2eResult<()>;
}

#[async_trait]
impl<T: KeyStore + ?Sized> KeyStore for Arc<T> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    async fn load_history(&self, user_id: &str) -> E2eResult<Option<KeyHistory>> {
        (**self).load_history(user_id).await
    }

    async fn save_history(&self, history: &KeyHistory) -> E2eResult<()> {
        (**self).save_history(history).await
    }
}

/// Key pair lifecycle on top of a [`KeyStore`].
///
/// Writes through one `KeyStorage` are serialized, so concurrent
/// `store`, `ensure` and `rotate` calls never drop a generation. Separate
/// handles on the same backend are still last-writer-wins.
pub struct KeyStorage<S, P> {
    store: S,
    provider: Arc<P>,
    write_lock: Mutex<()>,
}

impl<S: KeyStore, P: CryptoProvider> KeyStorage<S, P> {
    /// Create storage over `store`, generating keys with `provider`.
    pub fn new(store: S, provider: Arc<P>) -> Self {
        Self {
            store,
            provider,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying backend.
    pub fn store_backend(&self) -> &S {
        &self.store
    }

    /// Persist `key_pair` as the user's new current generation.
    ///
    /// Earlier generations stay readable through
    /// [`KeyStorage::retrieve_generation`].
    pub async fn store(&self, user_id: &str, key_pair: &KeyPair) -> E2eResult<KeyPairRecord> {
        let _guard = self.write_lock.lock().await;
        self.append(user_id, key_pair).await
    }

    /// Load, push and save. Callers hold `write_lock`.
    #[instrument(skip(self, key_pair), fields(subsystem = logging::SUBSYSTEM, store_backend = self.store.backend_name()))]
    async fn append(&self, user_id: &str, key_pair: &KeyPair) -> E2eResult<KeyPairRecord> {
        let mut history = self
            .store
            .load_history(user_id)
            .await?
            .unwrap_or_else(|| KeyHistory::new(user_id));
        let record = history.push(key_pair).clone();
        self.store.save_history(&history).await?;

        info!(
            op = "store",
            generation = record.generation,
            fingerprint = %record.fingerprint,
            "key pair stored"
        );
        Ok(record)
    }

    /// Current record for `user_id`, or `None` if nothing was stored.
    pub async fn retrieve(&self, user_id: &str) -> E2eResult<Option<KeyPairRecord>> {
        let record = self
            .store
            .load_history(user_id)
            .await?
            .and_then(|h| h.current().cloned());
        debug!(
            subsystem = logging::SUBSYSTEM,
            op = "retrieve",
            user_id,
            found = record.is_some(),
            "key lookup"
        );
        Ok(record)
    }

    /// A specific generation of the user's key pair.
    pub async fn retrieve_generation(
        &self,
        user_id: &str,
        generation: u32,
    ) -> E2eResult<KeyPairRecord> {
        self.store
            .load_history(user_id)
            .await?
            .and_then(|h| h.generation(generation).cloned())
            .ok_or_else(|| E2eError::UnknownGeneration {
                user_id: user_id.to_string(),
                generation,
            })
    }

    /// Every stored generation, oldest first. Empty if none.
    pub async fn history(&self, user_id: &str) -> E2eResult<Vec<KeyPairRecord>> {
        Ok(self
            .store
            .load_history(user_id)
            .await?
            .map(|h| h.records)
            .unwrap_or_default())
    }

    /// Reuse the current key pair, generating and storing one on first use.
    pub async fn ensure(&self, user_id: &str) -> E2eResult<KeyPairRecord> {
        let _guard = self.write_lock.lock().await;
        if let Some(record) = self.retrieve(user_id).await? {
            return Ok(record);
        }
        let key_pair = self.provider.generate_key_pair()?;
        self.append(user_id, &key_pair).await
    }

    /// Generate a new key pair and make it the current generation.
    pub async fn rotate(&self, user_id: &str) -> E2eResult<KeyPairRecord> {
        let key_pair = self.provider.generate_key_pair()?;
        self.store(user_id, &key_pair).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SeededProvider, SoftwareProvider};

    fn storage() -> KeyStorage<MemoryKeyStore, SoftwareProvider> {
        KeyStorage::new(MemoryKeyStore::new(), Arc::new(SoftwareProvider::new()))
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_none() {
        let storage = storage();
        assert!(storage.retrieve("nobody").await.unwrap().is_none());
        assert!(storage.history("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let storage = storage();
        let kp = KeyPair::generate(&SoftwareProvider::new()).unwrap();

        let stored = storage.store("alice", &kp).await.unwrap();
        assert_eq!(stored.generation, 1);
        assert_eq!(stored.fingerprint, kp.fingerprint());

        let loaded = storage.retrieve("alice").await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.key_pair().unwrap().public, kp.public);
    }

    #[tokio::test]
    async fn test_store_supersedes_but_keeps_history() {
        let storage = storage();
        let provider = SoftwareProvider::new();
        let first = KeyPair::generate(&provider).unwrap();
        let second = KeyPair::generate(&provider).unwrap();

        storage.store("alice", &first).await.unwrap();
        let current = storage.store("alice", &second).await.unwrap();
        assert_eq!(current.generation, 2);

        let loaded = storage.retrieve("alice").await.unwrap().unwrap();
        assert_eq!(loaded.fingerprint, second.fingerprint());

        let old = storage.retrieve_generation("alice", 1).await.unwrap();
        assert_eq!(old.fingerprint, first.fingerprint());
        assert_eq!(storage.history("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_generation() {
        let storage = storage();
        storage.ensure("alice").await.unwrap();
        let result = storage.retrieve_generation("alice", 5).await;
        assert!(matches!(
            result,
            Err(E2eError::UnknownGeneration { generation: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_reuses() {
        let storage = storage();
        let a = storage.ensure("alice").await.unwrap();
        let b = storage.ensure("alice").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(storage.history("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rotate_creates_new_generation() {
        let storage = storage();
        let a = storage.ensure("alice").await.unwrap();
        let b = storage.rotate("alice").await.unwrap();
        assert_eq!(b.generation, a.generation + 1);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotate_keeps_every_generation() {
        let storage = storage();
        storage.ensure("alice").await.unwrap();

        let mut returned = Vec::new();
        for _ in 0..10 {
            let (a, b) = tokio::join!(storage.rotate("alice"), storage.rotate("alice"));
            returned.push(a.unwrap());
            returned.push(b.unwrap());
        }

        let history = storage.history("alice").await.unwrap();
        assert_eq!(history.len(), 21);
        for record in &returned {
            assert_eq!(
                history.iter().find(|r| r.generation == record.generation),
                Some(record)
            );
        }
        let generations: Vec<u32> = history.iter().map(|r| r.generation).collect();
        assert_eq!(generations, (1..=21).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_creates_one_identity() {
        let storage = storage();
        let (a, b) = tokio::join!(storage.ensure("alice"), storage.ensure("alice"));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(storage.history("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let storage = storage();
        let alice = storage.ensure("alice").await.unwrap();
        let bob = storage.ensure("bob").await.unwrap();
        assert_ne!(alice.fingerprint, bob.fingerprint);
        assert_eq!(bob.user_id, "bob");
    }

    #[tokio::test]
    async fn test_seeded_provider_reproducible_records() {
        let a = KeyStorage::new(MemoryKeyStore::new(), Arc::new(SeededProvider::new(11)));
        let b = KeyStorage::new(MemoryKeyStore::new(), Arc::new(SeededProvider::new(11)));
        let ra = a.ensure("alice").await.unwrap();
        let rb = b.ensure("alice").await.unwrap();
        assert_eq!(ra.fingerprint, rb.fingerprint);
    }

    #[test]
    fn test_record_detects_fingerprint_tamper() {
        let kp = KeyPair::generate(&SoftwareProvider::new()).unwrap();
        let mut record = KeyPairRecord::new("alice", 1, &kp);
        record.fingerprint = "0".repeat(64);
        assert!(matches!(
            record.key_pair(),
            Err(E2eError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_record_detects_mismatched_halves() {
        let provider = SoftwareProvider::new();
        let kp = KeyPair::generate(&provider).unwrap();
        let other = KeyPair::generate(&provider).unwrap();
        let mut record = KeyPairRecord::new("alice", 1, &kp);
        record.public_key = export_public(&other.public);
        assert!(record.key_pair().is_err());
    }

    #[test]
    fn test_record_debug_hides_private_scalar() {
        let kp = KeyPair::generate(&SoftwareProvider::new()).unwrap();
        let record = KeyPairRecord::new("alice", 1, &kp);
        let d = record.private_key.d.clone().unwrap();
        assert!(!format!("{:?}", record).contains(&d));
    }

    #[test]
    fn test_history_next_generation() {
        let mut history = KeyHistory::new("alice");
        assert_eq!(history.next_generation(), 1);
        let kp = KeyPair::generate(&SoftwareProvider::new()).unwrap();
        history.push(&kp);
        history.push(&kp);
        assert_eq!(history.next_generation(), 3);
        assert_eq!(history.current().unwrap().generation, 2);
    }
}
