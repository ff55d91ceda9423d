//! Cryptographic error types
//!
//! This module defines all error types for the conversation encryption core.

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Asymmetric input encodes to an integer >= the modulus
    #[error("Message too large for modulus: {message_bits} bits vs {modulus_bits}-bit modulus")]
    MessageTooLargeForModulus {
        message_bits: u64,
        modulus_bits: u64,
    },

    /// AEAD tag did not verify (tampering, wrong key or wrong nonce)
    #[error("Authentication failed: ciphertext rejected")]
    AuthenticationFailure,

    /// The local identity private key is not available
    #[error("Local private key is missing")]
    MissingLocalPrivateKey,

    /// The local identity public key is not available
    #[error("Local public key is missing")]
    MissingLocalPublicKey,

    /// A message was sent or received before the session key was resolved
    #[error("Session key not resolved for session: {0}")]
    SessionKeyUnresolved(String),

    /// The public exponent shares a factor with lcm(p-1, q-1)
    #[error("Public exponent is not coprime with phi")]
    NonCoprimeExponent,

    /// Failed to generate a key
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Background key generation was cancelled before completing
    #[error("Key generation cancelled")]
    KeyGenerationCancelled,

    /// The symmetric cipher refused to encrypt
    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    /// Failed to parse or decode a key
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Base64 or UTF-8 decoding failed
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A wrapped session key did not decode to a valid block
    #[error("Malformed wrapped key: {0}")]
    MalformedWrappedKey(String),

    /// Too many messages are waiting for an unresolved session
    #[error("Pending queue full for session: {0}")]
    PendingQueueFull(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl CryptoError {
    /// Errors that end the current identity session
    ///
    /// There is no local recovery for a missing identity key; the caller has
    /// to force re-authentication or key re-provisioning.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CryptoError::MissingLocalPrivateKey | CryptoError::MissingLocalPublicKey
        )
    }

    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CryptoError::SessionKeyUnresolved(_) | CryptoError::DatabaseError(_)
        )
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::InvalidEncoding(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for CryptoError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        CryptoError::InvalidEncoding(e.to_string())
    }
}

impl From<aes_gcm::Error> for CryptoError {
    fn from(_: aes_gcm::Error) -> Self {
        CryptoError::AuthenticationFailure
    }
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::MessageTooLargeForModulus {
            message_bits: 2050,
            modulus_bits: 2048,
        };
        assert_eq!(
            err.to_string(),
            "Message too large for modulus: 2050 bits vs 2048-bit modulus"
        );
        assert_eq!(
            CryptoError::EncryptionError("AES-GCM".to_string()).to_string(),
            "Encryption failed: AES-GCM"
        );
        assert_eq!(
            CryptoError::SessionKeyUnresolved("42".to_string()).to_string(),
            "Session key not resolved for session: 42"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(CryptoError::MissingLocalPrivateKey.is_fatal());
        assert!(CryptoError::MissingLocalPublicKey.is_fatal());
        assert!(!CryptoError::AuthenticationFailure.is_fatal());

        assert!(!CryptoError::AuthenticationFailure.is_retryable());
        assert!(!CryptoError::EncryptionError("x".to_string()).is_retryable());
        assert!(!CryptoError::EncryptionError("x".to_string()).is_fatal());
        assert!(CryptoError::SessionKeyUnresolved("1".to_string()).is_retryable());
    }
}
