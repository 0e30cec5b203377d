//! Injectable cryptographic provider.
//!
//! Every primitive the module needs (randomness, key generation, ECDH,
//! HKDF, AES-256-GCM) goes through [`CryptoProvider`]. Only
//! [`CryptoProvider::fill_random`] is required; the remaining methods
//! default to the RustCrypto software implementations, so a
//! hardware-backed provider overrides only what it accelerates.

use std::sync::Mutex;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sha2::Sha256;

use crate::ecdh::SharedSecret;
use crate::error::{E2eError, E2eResult};
use crate::format::{KEY_LEN, NONCE_LEN};
use crate::keys::{KeyPair, PrivateKey, PublicKey};

/// Source of every cryptographic primitive used by this crate.
///
/// Methods are synchronous and run inline on the calling task, including
/// from the async [`crate::E2eClient`] and [`crate::KeyStorage`] paths.
/// Implementations must return quickly. A provider backed by a hardware
/// token or remote KMS that may block should be driven from
/// `tokio::task::spawn_blocking` by the caller, or it will stall a runtime
/// worker thread for the duration of the call.
pub trait CryptoProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Fill `dest` with cryptographically secure random bytes.
    ///
    /// Failure means the provider cannot operate at all and must surface
    /// as [`E2eError::CryptoUnavailable`].
    fn fill_random(&self, dest: &mut [u8]) -> E2eResult<()>;

    /// Generate a fresh P-256 key pair.
    fn generate_key_pair(&self) -> E2eResult<KeyPair> {
        KeyPair::from_random(self)
    }

    /// Raw P-256 Diffie-Hellman (x-coordinate of the shared point).
    fn ecdh(&self, private: &PrivateKey, public: &PublicKey) -> E2eResult<SharedSecret> {
        let shared = p256::ecdh::diffie_hellman(
            private.as_p256().to_nonzero_scalar(),
            public.as_p256().as_affine(),
        );
        let mut secret = [0u8; KEY_LEN];
        secret.copy_from_slice(shared.raw_secret_bytes());
        Ok(SharedSecret::from_bytes(secret))
    }

    /// HKDF-SHA256 extract-and-expand into `okm`.
    fn hkdf_sha256(&self, ikm: &[u8], salt: &[u8], info: &[u8], okm: &mut [u8]) -> E2eResult<()> {
        Hkdf::<Sha256>::new(Some(salt), ikm)
            .expand(info, okm)
            .map_err(|_| {
                E2eError::CryptoUnavailable(format!(
                    "HKDF-SHA256 cannot produce {} bytes",
                    okm.len()
                ))
            })
    }

    /// AES-256-GCM encryption; returns ciphertext with the 16-byte tag appended.
    fn aes_gcm_seal(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8],
    ) -> E2eResult<Vec<u8>> {
        aes_gcm_encrypt(key, nonce, plaintext)
    }

    /// AES-256-GCM decryption of ciphertext-with-tag.
    fn aes_gcm_open(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> E2eResult<Vec<u8>> {
        aes_gcm_decrypt(key, nonce, ciphertext)
    }
}

/// Software provider backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareProvider;

impl SoftwareProvider {
    /// Create a software provider.
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for SoftwareProvider {
    fn name(&self) -> &'static str {
        "software"
    }

    fn fill_random(&self, dest: &mut [u8]) -> E2eResult<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| E2eError::CryptoUnavailable(format!("OS random source failed: {}", e)))
    }
}

/// Deterministic provider seeded from a `u64`.
///
/// Intended for reproducible tests only. Never use it for real keys:
/// anyone who knows the seed can recompute every key and nonce.
#[derive(Debug)]
pub struct SeededProvider {
    rng: Mutex<StdRng>,
}

impl SeededProvider {
    /// Create a provider whose random stream is fixed by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CryptoProvider for SeededProvider {
    fn name(&self) -> &'static str {
        "seeded"
    }

    fn fill_random(&self, dest: &mut [u8]) -> E2eResult<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| E2eError::CryptoUnavailable("seeded RNG lock poisoned".to_string()))?;
        rng.fill_bytes(dest);
        Ok(())
    }
}

/// Encrypt plaintext with AES-256-GCM.
///
/// Returns ciphertext with appended authentication tag (16 bytes).
pub fn aes_gcm_encrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> E2eResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| E2eError::EncryptionFailed(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| E2eError::EncryptionFailed("AES-GCM encryption failed".into()))
}

/// Decrypt ciphertext with AES-256-GCM.
///
/// The ciphertext must include the authentication tag (16 bytes) at the end.
pub fn aes_gcm_decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> E2eResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| E2eError::DecryptionFailed("Invalid key".to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| E2eError::DecryptionFailed("authentication tag mismatch".to_string()))
}
