//! Elliptic-curve JSON Web Keys (RFC 7517 / RFC 7518 §6.2).
//!
//! JWK is the only interchange format for key material: the directory
//! service stores the public half as a JWK, and the local key store
//! persists both halves as JWKs. Import validates the document strictly
//! before any point or scalar reaches the curve arithmetic.
//!
//! # Example
//!
//! ```json
//! {
//!   "kty": "EC",
//!   "crv": "P-256",
//!   "x": "<32 bytes, base64url>",
//!   "y": "<32 bytes, base64url>",
//!   "ext": true,
//!   "key_ops": []
//! }
//! ```

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{E2eError, E2eResult};
use crate::format::{base64url_decode, base64url_encode};
use crate::keys::{PrivateKey, PublicKey, COORDINATE_LEN};

/// Required key type.
pub const KTY_EC: &str = "EC";

/// Required curve name.
pub const CRV_P256: &str = "P-256";

/// Key operation advertised on exported private keys.
pub const OP_DERIVE_BITS: &str = "deriveBits";

/// Elliptic-curve JWK.
///
/// `d` is present only on private key material. The struct zeroizes `d`
/// when dropped and never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    /// Key type, must be `"EC"`.
    pub kty: String,
    /// Curve name, must be `"P-256"`.
    pub crv: String,
    /// X coordinate, base64url without padding.
    pub x: String,
    /// Y coordinate, base64url without padding.
    pub y: String,
    /// Private scalar, base64url without padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// Extractable flag as emitted by WebCrypto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    /// Permitted key operations as emitted by WebCrypto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
}

/// Portable public key representation.
pub type PublicKeyMaterial = EcJwk;

/// Portable private key representation. Never transmitted.
pub type PrivateKeyMaterial = EcJwk;

impl EcJwk {
    /// Parse a JWK from a JSON value, mapping schema errors to
    /// [`E2eError::InvalidKeyMaterial`].
    pub fn from_value(value: serde_json::Value) -> E2eResult<Self> {
        serde_json::from_value(value).map_err(|e| E2eError::InvalidKeyMaterial(e.to_string()))
    }

    /// Parse a JWK from JSON text.
    pub fn from_json(json: &str) -> E2eResult<Self> {
        serde_json::from_str(json).map_err(|e| E2eError::InvalidKeyMaterial(e.to_string()))
    }

    /// Whether this JWK carries a private scalar.
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// Copy of this JWK with the private scalar stripped.
    pub fn to_public(&self) -> Self {
        Self {
            kty: self.kty.clone(),
            crv: self.crv.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
            d: None,
            ext: self.ext,
            key_ops: Some(Vec::new()),
        }
    }
}

impl Drop for EcJwk {
    fn drop(&mut self) {
        if let Some(d) = self.d.as_mut() {
            d.zeroize();
        }
    }
}

impl std::fmt::Debug for EcJwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcJwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("d", &self.d.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Export a public key as a WebCrypto-compatible JWK.
pub fn export_public(key: &PublicKey) -> PublicKeyMaterial {
    let raw = key.to_raw_bytes();
    EcJwk {
        kty: KTY_EC.to_string(),
        crv: CRV_P256.to_string(),
        x: base64url_encode(&raw[1..1 + COORDINATE_LEN]),
        y: base64url_encode(&raw[1 + COORDINATE_LEN..]),
        d: None,
        ext: Some(true),
        key_ops: Some(Vec::new()),
    }
}

/// Export a private key (with its public coordinates) as a JWK.
///
/// The result must only ever be written to the local key store.
pub fn export_private(key: &PrivateKey) -> PrivateKeyMaterial {
    let mut jwk = export_public(&key.public_key());
    let mut scalar = [0u8; COORDINATE_LEN];
    key.write_scalar(&mut scalar);
    jwk.d = Some(base64url_encode(&scalar));
    scalar.zeroize();
    jwk.key_ops = Some(vec![OP_DERIVE_BITS.to_string()]);
    jwk
}

/// Import and validate a public key JWK.
///
/// # Errors
///
/// [`E2eError::InvalidKeyMaterial`] if the key type or curve is wrong, a
/// coordinate is not 32 bytes of base64url, the point is not on P-256, or
/// the document carries a private scalar.
pub fn import_public(jwk: &PublicKeyMaterial) -> E2eResult<PublicKey> {
    if jwk.is_private() {
        return Err(E2eError::InvalidKeyMaterial(
            "public key material must not carry a private scalar".to_string(),
        ));
    }
    decode_point(jwk)
}

/// Import and validate a private key JWK.
///
/// The scalar must be valid for P-256 and its public point must equal the
/// `x`/`y` coordinates of the same document.
pub fn import_private(jwk: &PrivateKeyMaterial) -> E2eResult<PrivateKey> {
    let public = decode_point(jwk)?;
    let d = jwk
        .d
        .as_deref()
        .ok_or_else(|| E2eError::InvalidKeyMaterial("missing private scalar `d`".to_string()))?;
    let scalar = zeroize::Zeroizing::new(base64url_decode("d", d)?);
    let private = PrivateKey::from_bytes(&scalar)?;
    if private.public_key() != public {
        return Err(E2eError::InvalidKeyMaterial(
            "private scalar does not match public coordinates".to_string(),
        ));
    }
    Ok(private)
}

fn decode_point(jwk: &EcJwk) -> E2eResult<PublicKey> {
    if jwk.kty != KTY_EC {
        return Err(E2eError::InvalidKeyMaterial(format!(
            "unsupported key type `{}`",
            jwk.kty
        )));
    }
    if jwk.crv != CRV_P256 {
        return Err(E2eError::InvalidKeyMaterial(format!(
            "unsupported curve `{}`",
            jwk.crv
        )));
    }
    let x = decode_coordinate("x", &jwk.x)?;
    let y = decode_coordinate("y", &jwk.y)?;

    let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    PublicKey::from_sec1_bytes(&sec1)
}

fn decode_coordinate(field: &str, value: &str) -> E2eResult<Vec<u8>> {
    let bytes = base64url_decode(field, value)?;
    if bytes.len() != COORDINATE_LEN {
        return Err(E2eError::InvalidKeyMaterial(format!(
            "coordinate `{}` must be {} bytes, got {}",
            field,
            COORDINATE_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        export_public(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let jwk = EcJwk::deserialize(deserializer)?;
        import_public(&jwk).map_err(serde::de::Error::custom)
    }
}
