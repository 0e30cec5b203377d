//! High-level per-user encryption client.
//!
//! Ties key storage, the provider and the message cipher together so a
//! caller deals only in user ids, peer JWKs and wire payloads.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::directory::PublicKeyUpload;
use crate::error::{E2eError, E2eResult};
use crate::jwk::PublicKeyMaterial;
use crate::key_storage::{KeyPairRecord, KeyStorage, KeyStore};
use crate::keys::KeyPair;
use crate::logging;
use crate::message::{decrypt_message, encrypt_message, EncryptedPayload};
use crate::provider::CryptoProvider;

/// Encryption client over a key store and a crypto provider.
pub struct E2eClient<S, P> {
    storage: KeyStorage<S, P>,
    provider: Arc<P>,
}

impl<S: KeyStore, P: CryptoProvider> E2eClient<S, P> {
    pub fn new(store: S, provider: Arc<P>) -> Self {
        Self {
            storage: KeyStorage::new(store, Arc::clone(&provider)),
            provider,
        }
    }

    /// The key storage this client reads and writes.
    pub fn storage(&self) -> &KeyStorage<S, P> {
        &self.storage
    }

    /// Reuse the user's identity, creating it on first use.
    #[instrument(skip(self), fields(subsystem = logging::SUBSYSTEM, op = "ensure_identity"))]
    pub async fn ensure_identity(&self, user_id: &str) -> E2eResult<KeyPairRecord> {
        self.storage.ensure(user_id).await
    }

    /// Replace the user's identity with a new generation.
    ///
    /// Older generations stay available to
    /// [`E2eClient::decrypt_from_generation`].
    #[instrument(skip(self), fields(subsystem = logging::SUBSYSTEM, op = "rotate_identity"))]
    pub async fn rotate_identity(&self, user_id: &str) -> E2eResult<KeyPairRecord> {
        let record = self.storage.rotate(user_id).await?;
        info!(
            generation = record.generation,
            fingerprint = %record.fingerprint,
            "identity rotated"
        );
        Ok(record)
    }

    /// Directory upload for the user's current identity.
    pub async fn public_key_upload(
        &self,
        user_id: &str,
        device_label: Option<&str>,
    ) -> E2eResult<PublicKeyUpload> {
        let record = self.current(user_id).await?;
        Ok(PublicKeyUpload::from_record(&record, device_label))
    }

    /// Encrypt `plaintext` from `user_id` to the holder of `peer`.
    ///
    /// # Errors
    ///
    /// [`E2eError::KeyNotFound`] if the user has no identity yet.
    pub async fn encrypt_for(
        &self,
        user_id: &str,
        plaintext: &str,
        peer: &PublicKeyMaterial,
    ) -> E2eResult<EncryptedPayload> {
        let key_pair = self.current(user_id).await?.key_pair()?;
        encrypt_message(self.provider.as_ref(), plaintext, &key_pair.private, peer)
    }

    /// Decrypt a payload exchanged between `user_id` and `peer` with the
    /// user's current identity.
    ///
    /// Messages the user sent are opened with the recipient's key as
    /// `peer`.
    pub async fn decrypt_from(
        &self,
        user_id: &str,
        payload: &EncryptedPayload,
        peer: &PublicKeyMaterial,
    ) -> E2eResult<String> {
        let key_pair = self.current(user_id).await?.key_pair()?;
        self.open(&key_pair, payload, peer)
    }

    /// Decrypt with a specific, possibly retired, generation.
    pub async fn decrypt_from_generation(
        &self,
        user_id: &str,
        generation: u32,
        payload: &EncryptedPayload,
        peer: &PublicKeyMaterial,
    ) -> E2eResult<String> {
        let key_pair = self
            .storage
            .retrieve_generation(user_id, generation)
            .await?
            .key_pair()?;
        self.open(&key_pair, payload, peer)
    }

    async fn current(&self, user_id: &str) -> E2eResult<KeyPairRecord> {
        self.storage
            .retrieve(user_id)
            .await?
            .ok_or_else(|| E2eError::KeyNotFound(user_id.to_string()))
    }

    fn open(
        &self,
        key_pair: &KeyPair,
        payload: &EncryptedPayload,
        peer: &PublicKeyMaterial,
    ) -> E2eResult<String> {
        decrypt_message(
            self.provider.as_ref(),
            &payload.encrypted_content,
            &payload.nonce,
            &key_pair.private,
            peer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_storage::MemoryKeyStore;
    use crate::provider::SoftwareProvider;

    fn client() -> E2eClient<MemoryKeyStore, SoftwareProvider> {
        E2eClient::new(MemoryKeyStore::new(), Arc::new(SoftwareProvider::new()))
    }

    #[tokio::test]
    async fn test_conversation_between_two_clients() {
        let alice = client();
        let bob = client();
        let a = alice.ensure_identity("alice").await.unwrap();
        let b = bob.ensure_identity("bob").await.unwrap();

        let payload = alice
            .encrypt_for("alice", "hi bob", &b.public_key)
            .await
            .unwrap();
        let text = bob
            .decrypt_from("bob", &payload, &a.public_key)
            .await
            .unwrap();
        assert_eq!(text, "hi bob");
    }

    #[tokio::test]
    async fn test_sender_reads_own_message() {
        let client = client();
        client.ensure_identity("alice").await.unwrap();
        let bob = client.ensure_identity("bob").await.unwrap();

        let payload = client
            .encrypt_for("alice", "note to self", &bob.public_key)
            .await
            .unwrap();
        let text = client
            .decrypt_from("alice", &payload, &bob.public_key)
            .await
            .unwrap();
        assert_eq!(text, "note to self");
    }

    #[tokio::test]
    async fn test_missing_identity_is_key_not_found() {
        let client = client();
        let bob = client.ensure_identity("bob").await.unwrap();
        let result = client.encrypt_for("alice", "hi", &bob.public_key).await;
        assert!(matches!(result, Err(E2eError::KeyNotFound(ref u)) if u == "alice"));

        let upload = client.public_key_upload("alice", None).await;
        assert!(matches!(upload, Err(E2eError::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_rotation_keeps_old_messages_readable() {
        let client = client();
        client.ensure_identity("alice").await.unwrap();
        let bob = client.ensure_identity("bob").await.unwrap();
        let old_alice = client.storage().retrieve("alice").await.unwrap().unwrap();

        let payload = client
            .encrypt_for("bob", "before rotation", &old_alice.public_key)
            .await
            .unwrap();

        let rotated = client.rotate_identity("alice").await.unwrap();
        assert_eq!(rotated.generation, 2);

        let current = client.decrypt_from("alice", &payload, &bob.public_key).await;
        assert!(matches!(current, Err(E2eError::DecryptionFailed(_))));

        let text = client
            .decrypt_from_generation("alice", old_alice.generation, &payload, &bob.public_key)
            .await
            .unwrap();
        assert_eq!(text, "before rotation");
    }

    #[tokio::test]
    async fn test_public_key_upload_matches_identity() {
        let client = client();
        let record = client.ensure_identity("alice").await.unwrap();
        let upload = client.public_key_upload("alice", Some("laptop")).await.unwrap();
        assert_eq!(upload.key_fingerprint, record.fingerprint);
        assert_eq!(upload.device_label, "laptop");
        assert!(!upload.public_key_jwk.is_private());
    }
}
