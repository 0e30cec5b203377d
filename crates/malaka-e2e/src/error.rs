//! Error types for end-to-end encryption operations.

use thiserror::Error;

/// End-to-end encryption errors.
///
/// Each variant is a distinct failure class so callers (the messaging
/// transport, the UI) can tell "message undecryptable" apart from
/// "storage is down".
#[derive(Error, Debug)]
pub enum E2eError {
    /// The runtime cannot provide the required cryptographic primitives.
    #[error("Cryptographic provider unavailable: {0}")]
    CryptoUnavailable(String),

    /// Malformed, wrong-curve or inconsistent key material.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The durable key store could not be read or written.
    #[error("Key storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Authentication tag mismatch, corrupted input or wrong key.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The AEAD refused to seal the plaintext.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// A key pair was required but none has been stored for this user.
    #[error("No key pair stored for user {0}")]
    KeyNotFound(String),

    /// The requested key generation does not exist in the user's history.
    #[error("Unknown key generation {generation} for user {user_id}")]
    UnknownGeneration {
        /// User whose history was searched.
        user_id: String,
        /// Requested generation number.
        generation: u32,
    },
}

impl E2eError {
    /// Stable snake_case label for structured logs and UI mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CryptoUnavailable(_) => "crypto_unavailable",
            Self::InvalidKeyMaterial(_) => "invalid_key_material",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::DecryptionFailed(_) => "decryption_failed",
            Self::EncryptionFailed(_) => "encryption_failed",
            Self::KeyNotFound(_) => "key_not_found",
            Self::UnknownGeneration { .. } => "unknown_generation",
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only storage failures are potentially transient. The module itself
    /// never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

/// Result type for end-to-end encryption operations.
pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = E2eError::DecryptionFailed("tag mismatch".into());
        assert!(err.to_string().contains("tag mismatch"));
    }

    #[test]
    fn test_unknown_generation_display() {
        let err = E2eError::UnknownGeneration {
            user_id: "alice".into(),
            generation: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("alice"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_only_storage_is_retryable() {
        assert!(E2eError::StorageUnavailable("disk full".into()).is_retryable());
        assert!(!E2eError::DecryptionFailed("x".into()).is_retryable());
        assert!(!E2eError::InvalidKeyMaterial("x".into()).is_retryable());
        assert!(!E2eError::CryptoUnavailable("x".into()).is_retryable());
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            E2eError::CryptoUnavailable(String::new()).kind(),
            E2eError::InvalidKeyMaterial(String::new()).kind(),
            E2eError::StorageUnavailable(String::new()).kind(),
            E2eError::DecryptionFailed(String::new()).kind(),
            E2eError::EncryptionFailed(String::new()).kind(),
            E2eError::KeyNotFound(String::new()).kind(),
            E2eError::UnknownGeneration {
                user_id: String::new(),
                generation: 0,
            }
            .kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
