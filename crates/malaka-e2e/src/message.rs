//! Authenticated message encryption for chat payloads.
//!
//! # Encryption Flow
//!
//! 1. Derive the pairwise symmetric key (see [`crate::ecdh`])
//! 2. Draw a fresh random 96-bit nonce from the provider
//! 3. UTF-8 encode the plaintext
//! 4. AES-256-GCM seal, producing ciphertext || 128-bit tag
//! 5. Base64-encode ciphertext and nonce for the text transport
//!
//! # Decryption Flow
//!
//! 1. Derive the same symmetric key from the receiver's side
//! 2. Base64-decode ciphertext and nonce
//! 3. AES-256-GCM open; any tampering fails the tag check
//! 4. UTF-8 decode the recovered bytes
//!
//! Every failure on the receive path is [`E2eError::DecryptionFailed`];
//! no path yields empty or partial plaintext.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ecdh::{derive_symmetric_key, SymmetricKey};
use crate::error::{E2eError, E2eResult};
use crate::format::{base64_decode, base64_encode, NONCE_LEN, TAG_LEN};
use crate::jwk::PublicKeyMaterial;
use crate::keys::PrivateKey;
use crate::logging;
use crate::provider::CryptoProvider;

/// Encrypted message as relayed by the transport.
///
/// Serializes as `{"encrypted_content": "...", "nonce": "..."}`, the
/// field names the messaging service stores verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Ciphertext with appended tag, standard base64.
    pub encrypted_content: String,
    /// 12-byte nonce, standard base64.
    pub nonce: String,
}

impl EncryptedPayload {
    /// Attach the sender's directory key id for the send request.
    pub fn into_outgoing(self, sender_public_key_id: Option<String>) -> OutgoingMessage {
        OutgoingMessage {
            encrypted_content: self.encrypted_content,
            nonce: self.nonce,
            sender_public_key_id,
        }
    }
}

/// Body of a send-message request to the messaging service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Ciphertext with appended tag, standard base64.
    pub encrypted_content: String,
    /// 12-byte nonce, standard base64.
    pub nonce: String,
    /// Directory id of the key the sender encrypted with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_public_key_id: Option<String>,
}

impl OutgoingMessage {
    /// The ciphertext/nonce pair without the routing metadata.
    pub fn payload(&self) -> EncryptedPayload {
        EncryptedPayload {
            encrypted_content: self.encrypted_content.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

/// Encrypt `plaintext` for the holder of `peer_public`.
///
/// # Example
///
/// ```rust
/// use malaka_e2e::{decrypt_message, encrypt_message, export_public, KeyPair, SoftwareProvider};
///
/// let provider = SoftwareProvider::new();
/// let alice = KeyPair::generate(&provider).unwrap();
/// let bob = KeyPair::generate(&provider).unwrap();
///
/// let payload = encrypt_message(&provider, "hello", &alice.private, &export_public(&bob.public)).unwrap();
/// let text = decrypt_message(
///     &provider,
///     &payload.encrypted_content,
///     &payload.nonce,
///     &bob.private,
///     &export_public(&alice.public),
/// )
/// .unwrap();
/// assert_eq!(text, "hello");
/// ```
pub fn encrypt_message<P: CryptoProvider + ?Sized>(
    provider: &P,
    plaintext: &str,
    my_private: &PrivateKey,
    peer_public: &PublicKeyMaterial,
) -> E2eResult<EncryptedPayload> {
    let key = derive_symmetric_key(provider, my_private, peer_public)?;
    encrypt_with_key(provider, &key, plaintext)
}

/// Decrypt a payload sent by (or to) the holder of `peer_public`.
///
/// # Errors
///
/// - [`E2eError::InvalidKeyMaterial`] if `peer_public` is malformed
/// - [`E2eError::DecryptionFailed`] on bad encoding, wrong nonce length,
///   tag mismatch, wrong key or non-UTF-8 plaintext
pub fn decrypt_message<P: CryptoProvider + ?Sized>(
    provider: &P,
    encrypted_content: &str,
    nonce: &str,
    my_private: &PrivateKey,
    peer_public: &PublicKeyMaterial,
) -> E2eResult<String> {
    let key = derive_symmetric_key(provider, my_private, peer_public)?;
    decrypt_with_key(provider, &key, encrypted_content, nonce)
}

/// Encrypt under an already derived key with a fresh random nonce.
pub fn encrypt_with_key<P: CryptoProvider + ?Sized>(
    provider: &P,
    key: &SymmetricKey,
    plaintext: &str,
) -> E2eResult<EncryptedPayload> {
    let mut nonce = [0u8; NONCE_LEN];
    provider.fill_random(&mut nonce)?;

    let ciphertext = provider.aes_gcm_seal(key.as_bytes(), &nonce, plaintext.as_bytes())?;
    debug!(
        subsystem = logging::SUBSYSTEM,
        op = "encrypt",
        ciphertext_len = ciphertext.len(),
        "message sealed"
    );

    Ok(EncryptedPayload {
        encrypted_content: base64_encode(&ciphertext),
        nonce: base64_encode(&nonce),
    })
}

/// Decrypt under an already derived key.
pub fn decrypt_with_key<P: CryptoProvider + ?Sized>(
    provider: &P,
    key: &SymmetricKey,
    encrypted_content: &str,
    nonce: &str,
) -> E2eResult<String> {
    let ciphertext = base64_decode(encrypted_content)?;
    let nonce_bytes = base64_decode(nonce)?;

    let nonce: [u8; NONCE_LEN] = nonce_bytes.as_slice().try_into().map_err(|_| {
        E2eError::DecryptionFailed(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        ))
    })?;
    if ciphertext.len() < TAG_LEN {
        return Err(E2eError::DecryptionFailed(format!(
            "ciphertext shorter than the {}-byte tag",
            TAG_LEN
        )));
    }

    let plaintext = provider
        .aes_gcm_open(key.as_bytes(), &nonce, &ciphertext)
        .map_err(|e| {
            warn!(
                subsystem = logging::SUBSYSTEM,
                op = "decrypt",
                error = e.kind(),
                "message rejected"
            );
            e
        })?;

    String::from_utf8(plaintext)
        .map_err(|_| E2eError::DecryptionFailed("plaintext is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdh::derive_symmetric_key_from;
    use crate::jwk::export_public;
    use crate::keys::KeyPair;
    use crate::provider::SoftwareProvider;

    struct Pair {
        provider: SoftwareProvider,
        alice: KeyPair,
        bob: KeyPair,
    }

    fn pair() -> Pair {
        let provider = SoftwareProvider::new();
        let alice = KeyPair::generate(&provider).unwrap();
        let bob = KeyPair::generate(&provider).unwrap();
        Pair {
            provider,
            alice,
            bob,
        }
    }

    fn roundtrip(p: &Pair, text: &str) -> String {
        let payload = encrypt_message(
            &p.provider,
            text,
            &p.alice.private,
            &export_public(&p.bob.public),
        )
        .unwrap();
        decrypt_message(
            &p.provider,
            &payload.encrypted_content,
            &payload.nonce,
            &p.bob.private,
            &export_public(&p.alice.public),
        )
        .unwrap()
    }

    #[test]
    fn test_roundtrip_ascii() {
        let p = pair();
        assert_eq!(roundtrip(&p, "hello world"), "hello world");
    }

    #[test]
    fn test_roundtrip_empty() {
        let p = pair();
        assert_eq!(roundtrip(&p, ""), "");
    }

    #[test]
    fn test_roundtrip_multibyte() {
        let p = pair();
        let text = "Selamat pagi 👋 — こんにちは — Привет — مرحبا";
        assert_eq!(roundtrip(&p, text), text);
    }

    #[test]
    fn test_sender_can_decrypt_own_message() {
        let p = pair();
        let bob_jwk = export_public(&p.bob.public);
        let payload = encrypt_message(&p.provider, "note to self", &p.alice.private, &bob_jwk).unwrap();

        let text = decrypt_message(
            &p.provider,
            &payload.encrypted_content,
            &payload.nonce,
            &p.alice.private,
            &bob_jwk,
        )
        .unwrap();
        assert_eq!(text, "note to self");
    }

    #[test]
    fn test_nonce_and_ciphertext_fresh_per_call() {
        let p = pair();
        let key = derive_symmetric_key_from(&p.provider, &p.alice.private, &p.bob.public).unwrap();

        let a = encrypt_with_key(&p.provider, &key, "same").unwrap();
        let b = encrypt_with_key(&p.provider, &key, "same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.encrypted_content, b.encrypted_content);
    }

    #[test]
    fn test_encoded_lengths() {
        let p = pair();
        let key = derive_symmetric_key_from(&p.provider, &p.alice.private, &p.bob.public).unwrap();
        let payload = encrypt_with_key(&p.provider, &key, "abc").unwrap();

        assert_eq!(base64_decode(&payload.nonce).unwrap().len(), NONCE_LEN);
        assert_eq!(
            base64_decode(&payload.encrypted_content).unwrap().len(),
            3 + TAG_LEN
        );
    }

    #[test]
    fn test_wrong_peer_fails() {
        let p = pair();
        let eve = KeyPair::generate(&p.provider).unwrap();
        let payload = encrypt_message(
            &p.provider,
            "secret",
            &p.alice.private,
            &export_public(&p.bob.public),
        )
        .unwrap();

        let result = decrypt_message(
            &p.provider,
            &payload.encrypted_content,
            &payload.nonce,
            &eve.private,
            &export_public(&p.alice.public),
        );
        assert!(matches!(result, Err(E2eError::DecryptionFailed(_))));
    }

    #[test]
    fn test_short_nonce_fails() {
        let p = pair();
        let key = derive_symmetric_key_from(&p.provider, &p.alice.private, &p.bob.public).unwrap();
        let payload = encrypt_with_key(&p.provider, &key, "x").unwrap();

        let result = decrypt_with_key(&p.provider, &key, &payload.encrypted_content, &base64_encode(&[0u8; 8]));
        assert!(matches!(result, Err(E2eError::DecryptionFailed(msg)) if msg.contains("nonce")));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let p = pair();
        let key = derive_symmetric_key_from(&p.provider, &p.alice.private, &p.bob.public).unwrap();
        let payload = encrypt_with_key(&p.provider, &key, "x").unwrap();

        let result = decrypt_with_key(&p.provider, &key, &base64_encode(&[1u8; 4]), &payload.nonce);
        assert!(matches!(result, Err(E2eError::DecryptionFailed(_))));
    }

    #[test]
    fn test_non_utf8_plaintext_fails() {
        let p = pair();
        let key = derive_symmetric_key_from(&p.provider, &p.alice.private, &p.bob.public).unwrap();
        let nonce = [3u8; NONCE_LEN];
        let sealed = p
            .provider
            .aes_gcm_seal(key.as_bytes(), &nonce, &[0xff, 0xfe, 0xfd])
            .unwrap();

        let result = decrypt_with_key(&p.provider, &key, &base64_encode(&sealed), &base64_encode(&nonce));
        assert!(matches!(result, Err(E2eError::DecryptionFailed(msg)) if msg.contains("UTF-8")));
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = EncryptedPayload {
            encrypted_content: "Y3Q=".to_string(),
            nonce: "bm9uY2U=".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["encrypted_content"], "Y3Q=");
        assert_eq!(json["nonce"], "bm9uY2U=");

        let outgoing = payload.clone().into_outgoing(Some("key-1".into()));
        let json = serde_json::to_value(&outgoing).unwrap();
        assert_eq!(json["sender_public_key_id"], "key-1");
        assert_eq!(outgoing.payload(), payload);
    }

    #[test]
    fn test_outgoing_omits_missing_key_id() {
        let outgoing = EncryptedPayload {
            encrypted_content: "a".into(),
            nonce: "b".into(),
        }
        .into_outgoing(None);
        let json = serde_json::to_string(&outgoing).unwrap();
        assert!(!json.contains("sender_public_key_id"));
    }
}
