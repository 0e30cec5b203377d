//! P-256 key pairs and public-key fingerprints.
//!
//! This module provides:
//! - Key pair generation through an injected [`CryptoProvider`]
//! - SEC1 raw point encoding of public keys
//! - SHA-256 fingerprints for out-of-band verification
//!
//! # Security
//!
//! - Private scalars are zeroized on drop (delegated to `p256::SecretKey`)
//! - `Debug` output of private keys is redacted
//! - Scalars come from the provider's CSPRNG, never a general-purpose PRNG

use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

use crate::error::{E2eError, E2eResult};
use crate::provider::CryptoProvider;

/// Length of a P-256 scalar / coordinate in bytes.
pub const COORDINATE_LEN: usize = 32;

/// Length of an uncompressed SEC1 point (`0x04 || x || y`).
pub const RAW_PUBLIC_KEY_LEN: usize = 1 + 2 * COORDINATE_LEN;

/// Length of a hex-encoded SHA-256 fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

/// Attempts made to draw a valid scalar before giving up.
const MAX_SCALAR_ATTEMPTS: usize = 8;

/// P-256 public key.
///
/// Public keys can be freely shared; peers use them to derive the
/// pairwise symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(p256::PublicKey);

impl PublicKey {
    /// Parse a SEC1-encoded point (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> E2eResult<Self> {
        p256::PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| E2eError::InvalidKeyMaterial("point is not on curve P-256".to_string()))
    }

    /// Uncompressed SEC1 encoding (`0x04 || x || y`, 65 bytes).
    ///
    /// This is the "raw" export format fingerprints are computed over.
    pub fn to_raw_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// SHA-256 fingerprint of the raw point, lowercase hex.
    pub fn fingerprint(&self) -> String {
        compute_fingerprint(self)
    }

    pub(crate) fn as_p256(&self) -> &p256::PublicKey {
        &self.0
    }
}

impl From<p256::PublicKey> for PublicKey {
    fn from(key: p256::PublicKey) -> Self {
        Self(key)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", &self.fingerprint()[..16])
    }
}

/// P-256 private key with automatic zeroization.
///
/// The scalar never leaves the process except through
/// [`crate::jwk::export_private`], which only the key store calls.
#[derive(Clone)]
pub struct PrivateKey(p256::SecretKey);

impl PrivateKey {
    /// Create a private key from a 32-byte big-endian scalar.
    ///
    /// Rejects zero and values not below the curve order.
    pub fn from_bytes(bytes: &[u8]) -> E2eResult<Self> {
        if bytes.len() != COORDINATE_LEN {
            return Err(E2eError::InvalidKeyMaterial(format!(
                "private scalar must be {} bytes, got {}",
                COORDINATE_LEN,
                bytes.len()
            )));
        }
        p256::SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| E2eError::InvalidKeyMaterial("scalar out of range for P-256".to_string()))
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Copy the big-endian scalar into a caller-owned buffer.
    pub(crate) fn write_scalar(&self, out: &mut [u8; COORDINATE_LEN]) {
        out.copy_from_slice(&self.0.to_bytes());
    }

    pub(crate) fn as_p256(&self) -> &p256::SecretKey {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// P-256 key pair used for ECDH key agreement.
#[derive(Clone)]
pub struct KeyPair {
    /// The public key (can be shared).
    pub public: PublicKey,
    /// The private key (must be kept secret).
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the provider's random source.
    ///
    /// # Errors
    ///
    /// Returns [`E2eError::CryptoUnavailable`] if the random source fails.
    pub fn generate<P: CryptoProvider + ?Sized>(provider: &P) -> E2eResult<Self> {
        provider.generate_key_pair()
    }

    /// Draw scalars from `provider` until one is valid for P-256.
    pub(crate) fn from_random<P: CryptoProvider + ?Sized>(provider: &P) -> E2eResult<Self> {
        let mut candidate = zeroize::Zeroizing::new([0u8; COORDINATE_LEN]);
        for _ in 0..MAX_SCALAR_ATTEMPTS {
            provider.fill_random(&mut candidate[..])?;
            if let Ok(private) = PrivateKey::from_bytes(&candidate[..]) {
                return Ok(Self::from_private(private));
            }
        }
        Err(E2eError::CryptoUnavailable(
            "random source produced no valid P-256 scalar".to_string(),
        ))
    }

    /// Create a key pair from an existing private key.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { public, private }
    }

    /// Fingerprint of the public half.
    pub fn fingerprint(&self) -> String {
        self.public.fingerprint()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Compute the fingerprint of a public key.
///
/// SHA-256 over the uncompressed SEC1 point, hex-encoded in lowercase
/// without separators. Always [`FINGERPRINT_LEN`] characters.
pub fn compute_fingerprint(public: &PublicKey) -> String {
    hex::encode(Sha256::digest(public.to_raw_bytes()))
}
