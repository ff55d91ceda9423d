//! Conversation key exchange
//!
//! The initiator generates one conversation key and wraps it twice, under its
//! own public key and under the peer's. Each participant later unwraps only the
//! copy addressed to them; no further coordination is needed.
//!
//! ```text
//! Requested --initiate--> KeyWrapped --resolve (per participant)--> KeyResolved --both--> Active
//! ```

use crate::crypto::aes::SymmetricKey;
use crate::crypto::codec;
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::keys::{AsymmetricPrivateKey, AsymmetricPublicKey};
use crate::crypto::rsa::{self, WrapEncoding};
use crate::models::SessionCreationRequest;

/// Progress of a conversation's key exchange as seen by one client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Creation requested, no key material yet
    Requested,
    /// Both wrapped copies exist
    KeyWrapped,
    /// The local participant holds the unwrapped key
    KeyResolved,
    /// Both participants hold the key
    Active,
}

impl SessionState {
    /// State after the local participant resolved its copy
    pub fn on_local_resolved(self) -> Self {
        self.max(SessionState::KeyResolved)
    }

    /// State after a message from the peer authenticated under the session key,
    /// which proves the peer resolved its copy too
    pub fn on_peer_proved_key(self) -> Self {
        match self {
            SessionState::KeyResolved | SessionState::Active => SessionState::Active,
            other => other,
        }
    }
}

/// The two wrapped copies of a new conversation key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedSessionKeys {
    /// Base64 ciphertext under the initiator's public key
    pub for_initiator: String,
    /// Base64 ciphertext under the peer's public key
    pub for_peer: String,
}

/// Generate a conversation key and wrap it for both participants
pub fn initiate_session(
    self_public: &AsymmetricPublicKey,
    peer_public: &AsymmetricPublicKey,
    encoding: WrapEncoding,
) -> CryptoResult<WrappedSessionKeys> {
    let key = SymmetricKey::generate();

    let wrapped = WrappedSessionKeys {
        for_initiator: wrap_key(&key, self_public, encoding)?,
        for_peer: wrap_key(&key, peer_public, encoding)?,
    };

    tracing::debug!(
        initiator = %self_public.fingerprint(),
        peer = %peer_public.fingerprint(),
        "Wrapped new conversation key"
    );
    Ok(wrapped)
}

/// [`initiate_session`] for published base64 keys (A = initiator, B = peer)
pub fn initiate_from_request(
    request: &SessionCreationRequest,
    encoding: WrapEncoding,
) -> CryptoResult<WrappedSessionKeys> {
    let self_public = AsymmetricPublicKey::from_base64(&request.participant_a_public_key)?;
    let peer_public = AsymmetricPublicKey::from_base64(&request.participant_b_public_key)?;
    initiate_session(&self_public, &peer_public, encoding)
}

/// Wrap an exported conversation key under one public key
pub fn wrap_key(
    key: &SymmetricKey,
    public_key: &AsymmetricPublicKey,
    encoding: WrapEncoding,
) -> CryptoResult<String> {
    let exported = key.export();
    let c = rsa::encrypt(exported.as_bytes(), public_key, encoding)?;
    codec::to_base64_fixed(&c, public_key.byte_width())
}

/// Unwrap the copy addressed to the local participant
pub fn resolve_session(
    wrapped_for_self: &str,
    self_private: &AsymmetricPrivateKey,
    encoding: WrapEncoding,
) -> CryptoResult<SymmetricKey> {
    let c = codec::from_base64(wrapped_for_self)?;
    if c >= self_private.modulus {
        return Err(CryptoError::MalformedWrappedKey(
            "ciphertext exceeds modulus".to_string(),
        ));
    }

    let exported = rsa::decrypt(&c, self_private, encoding)?;
    let exported = String::from_utf8(exported)
        .map_err(|_| CryptoError::MalformedWrappedKey("key text is not UTF-8".to_string()))?;

    SymmetricKey::import(&exported)
        .map_err(|e| CryptoError::MalformedWrappedKey(e.to_string()))
}
