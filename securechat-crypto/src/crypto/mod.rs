//! Conversation encryption module
//!
//! Hybrid scheme: each user owns a textbook RSA identity key pair, each
//! conversation owns one AES-256-GCM key, and the conversation key reaches both
//! participants wrapped under their public keys.
//!
//! ## Components
//!
//! - **codec**: Big integer <-> bytes/base64 conversion
//! - **arith**: Modular exponentiation, extended GCD, inverses
//! - **primality**: Miller-Rabin with a small-prime sieve
//! - **keys**: Identity key pairs and background generation
//! - **rsa**: Key wrapping block layouts and textbook RSA
//! - **aes**: Conversation keys and message encryption
//! - **exchange**: Two-party session key exchange
//! - **store**: Identity key storage (SQLite-backed)
//! - **service**: High-level CryptoService facade
//!
//! ## Usage
//!
//! ```rust,ignore
//! use securechat_crypto::crypto::{CryptoService, KeyGenerator};
//!
//! let key_pair = KeyGenerator::spawn(config.clone()).join().await?;
//! let service = CryptoService::new(user_id, config);
//! service.set_identity(&key_pair).await;
//!
//! let delivered = service.resolve_session(&session).await?;
//! let outgoing = service.encrypt_outgoing(&session.id, "hi").await?;
//! ```

pub mod aes;
pub mod arith;
pub mod codec;
pub mod errors;
pub mod exchange;
pub mod keys;
pub mod primality;
pub mod rsa;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use aes::{EncryptedEnvelope, SymmetricKey};
pub use errors::{CryptoError, CryptoResult};
pub use exchange::{SessionState, WrappedSessionKeys};
pub use keys::{AsymmetricKeyPair, AsymmetricPrivateKey, AsymmetricPublicKey, KeyGenHandle, KeyGenerator};
pub use rsa::WrapEncoding;
pub use service::{ConversationCryptoContext, CryptoEvent, CryptoService, Inbound};
pub use store::IdentityKeyStore;
