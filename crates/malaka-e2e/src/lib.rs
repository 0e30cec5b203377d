//! # malaka-e2e
//!
//! End-to-end encryption for Malaka chat.
//!
//! Every user owns a long-lived P-256 key pair. Two users derive the same
//! AES-256-GCM key from their own private key and the other's public key,
//! so the messaging service only ever relays ciphertext.
//!
//! ## Cryptographic Primitives
//!
//! - **Key agreement**: ECDH on NIST P-256
//! - **Key derivation**: HKDF-SHA256, salt `malaka-e2e-chat`, info `aes-gcm-256`
//! - **Symmetric cipher**: AES-256-GCM, 96-bit random nonce, 128-bit tag
//! - **Key format**: JWK (`kty: EC`, `crv: P-256`), WebCrypto compatible
//! - **Fingerprint**: SHA-256 of the uncompressed public point, lowercase hex
//! - **Randomness**: injected [`CryptoProvider`], OS CSPRNG by default
//!
//! ## Wire Format
//!
//! ```text
//! {
//!   "encrypted_content": base64(ciphertext || tag),
//!   "nonce":             base64(12 random bytes)
//! }
//! ```
//!
//! ## Examples
//!
//! ### Exchange a Message
//!
//! ```rust
//! use malaka_e2e::{decrypt_message, encrypt_message, KeyPair, SoftwareProvider, export_public};
//!
//! let provider = SoftwareProvider::new();
//! let alice = KeyPair::generate(&provider).unwrap();
//! let bob = KeyPair::generate(&provider).unwrap();
//!
//! let payload = encrypt_message(&provider, "hi", &alice.private, &export_public(&bob.public)).unwrap();
//! let text = decrypt_message(
//!     &provider,
//!     &payload.encrypted_content,
//!     &payload.nonce,
//!     &bob.private,
//!     &export_public(&alice.public),
//! )
//! .unwrap();
//! assert_eq!(text, "hi");
//! ```
//!
//! ### Persistent Identities
//!
//! ```rust
//! use std::sync::Arc;
//! use malaka_e2e::{E2eClient, FileKeyStore, SoftwareProvider};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! let client = E2eClient::new(FileKeyStore::new(dir.path()), Arc::new(SoftwareProvider::new()));
//!
//! let alice = client.ensure_identity("alice").await.unwrap();
//! let again = client.ensure_identity("alice").await.unwrap();
//! assert_eq!(alice.fingerprint, again.fingerprint);
//! # });
//! ```

pub mod client;
pub mod config;
pub mod directory;
pub mod ecdh;
pub mod error;
pub mod format;
pub mod jwk;
pub mod key_storage;
pub mod keys;
pub mod logging;
pub mod message;
pub mod provider;

// Re-export commonly used types
pub use client::E2eClient;
pub use config::{ConfigError, E2eConfig, StoreBackend, StoreConfig};
pub use directory::{DirectoryEntry, PublicKeyUpload};
pub use ecdh::{derive_symmetric_key, derive_symmetric_key_from, SymmetricKey};
pub use error::{E2eError, E2eResult};
pub use jwk::{
    export_private, export_public, import_private, import_public, EcJwk, PrivateKeyMaterial,
    PublicKeyMaterial,
};
pub use key_storage::{
    FileKeyStore, KeyHistory, KeyPairRecord, KeyStorage, KeyStore, MemoryKeyStore,
};
pub use keys::{compute_fingerprint, KeyPair, PrivateKey, PublicKey};
pub use message::{
    decrypt_message, decrypt_with_key, encrypt_message, encrypt_with_key, EncryptedPayload,
    OutgoingMessage,
};
pub use provider::{CryptoProvider, SeededProvider, SoftwareProvider};
