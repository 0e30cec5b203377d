//! Shared text-encoding utilities.
//!
//! Transport payloads use standard padded base64; JWK coordinates use
//! unpadded base64url as required by RFC 7518.

use base64::Engine;

use crate::error::{E2eError, E2eResult};

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended by AES-256-GCM (128 bits).
pub const TAG_LEN: usize = 16;

/// Symmetric key length for AES-256-GCM.
pub const KEY_LEN: usize = 32;

/// Encode bytes as standard base64 (transport encoding).
pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a standard base64 transport field.
///
/// Malformed input is reported as [`E2eError::DecryptionFailed`], since
/// the only consumer is the receive path of the message cipher.
pub fn base64_decode(data: &str) -> E2eResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| E2eError::DecryptionFailed(format!("Invalid base64: {}", e)))
}

/// Encode bytes as unpadded base64url (JWK encoding).
pub fn base64url_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url JWK field.
pub fn base64url_decode(field: &str, data: &str) -> E2eResult<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| E2eError::InvalidKeyMaterial(format!("Field `{}` is not base64url: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let original = [42u8; 32];
        let encoded = base64_encode(&original);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(original.as_slice(), decoded.as_slice());
    }

    #[test]
    fn test_base64_decode_invalid() {
        let result = base64_decode("not valid base64!!!");
        assert!(matches!(result, Err(E2eError::DecryptionFailed(_))));
    }

    #[test]
    fn test_base64url_has_no_padding() {
        let encoded = base64url_encode(&[0xfb, 0xff]);
        assert_eq!(encoded, "-_8");
    }

    #[test]
    fn test_base64url_decode_rejects_standard_alphabet() {
        let result = base64url_decode("x", "+/8=");
        assert!(matches!(result, Err(E2eError::InvalidKeyMaterial(msg)) if msg.contains('x')));
    }
}
