//! Error types for the SecureChat client layer

use thiserror::Error;

use crate::crypto::CryptoError;

/// Client-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Could not create conversation: {0}")]
    SessionCreation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for client operations
pub type AppResult<T> = Result<T, AppError>;

// Frontends receive errors as plain strings
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
