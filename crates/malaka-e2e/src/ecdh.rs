//! P-256 key agreement and symmetric key derivation.
//!
//! # Protocol
//!
//! 1. Import the peer's public JWK (strictly validated)
//! 2. shared_secret = ECDH(my_private, peer_public), 32 bytes
//! 3. key = HKDF-SHA256(ikm = shared_secret, salt = [`HKDF_SALT`],
//!    info = [`HKDF_INFO`]), 32 bytes
//!
//! Both sides run the same steps with the roles swapped and arrive at
//! the same key, so the key itself is never transmitted. Salt and info
//! are fixed protocol constants: a secret derived here cannot be
//! reinterpreted as key material for another protocol.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::E2eResult;
use crate::format::KEY_LEN;
use crate::jwk::{import_public, PublicKeyMaterial};
use crate::keys::{PrivateKey, PublicKey};
use crate::provider::CryptoProvider;

/// HKDF salt binding derived keys to this messaging protocol.
pub const HKDF_SALT: &[u8] = b"malaka-e2e-chat";

/// HKDF info identifying the output as an AES-GCM-256 key.
pub const HKDF_INFO: &[u8] = b"aes-gcm-256";

/// Shared secret from ECDH (32 bytes).
///
/// This is the raw x-coordinate of the shared point. It must go through
/// HKDF before use as an encryption key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_LEN]);

impl SharedSecret {
    /// Wrap raw ECDH output. Used by provider implementations.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the shared secret.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM key derived for one (my key, peer key) pair.
///
/// Usable only for message encryption and decryption in this crate; the
/// bytes are not exposed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the pairwise symmetric key from my private key and the peer's
/// public JWK.
///
/// Pure in its two key inputs: repeated calls return bit-identical keys,
/// and `derive(a_priv, b_pub)` equals `derive(b_priv, a_pub)`.
///
/// # Errors
///
/// [`crate::E2eError::InvalidKeyMaterial`] if the peer JWK is malformed.
pub fn derive_symmetric_key<P: CryptoProvider + ?Sized>(
    provider: &P,
    my_private: &PrivateKey,
    peer_public: &PublicKeyMaterial,
) -> E2eResult<SymmetricKey> {
    let peer = import_public(peer_public)?;
    derive_symmetric_key_from(provider, my_private, &peer)
}

/// Same as [`derive_symmetric_key`] for an already imported peer key.
pub fn derive_symmetric_key_from<P: CryptoProvider + ?Sized>(
    provider: &P,
    my_private: &PrivateKey,
    peer_public: &PublicKey,
) -> E2eResult<SymmetricKey> {
    let shared = provider.ecdh(my_private, peer_public)?;
    let mut key = [0u8; KEY_LEN];
    provider.hkdf_sha256(shared.as_bytes(), HKDF_SALT, HKDF_INFO, &mut key)?;
    Ok(SymmetricKey(key))
}
