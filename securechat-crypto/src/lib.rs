//! SecureChat - Conversation encryption core
//!
//! This crate holds all key management and message cryptography for the
//! SecureChat client. The transport, persistence of messages and UI live
//! outside; they exchange opaque base64 payloads with this crate.

pub mod config;
pub mod crypto;
pub mod error;
pub mod messaging;
pub mod models;
pub mod transport;

pub use config::CryptoConfig;
pub use error::{AppError, AppResult};
pub use messaging::ChatClient;
pub use transport::{ClientFrame, Connection, ConnectionState, RemoteEnd, ServerEvent};

/// Install the global tracing subscriber
///
/// Honors `RUST_LOG`; defaults to `securechat_crypto=info`. Calling it twice
/// is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "securechat_crypto=info".into()),
        )
        .try_init();
}
