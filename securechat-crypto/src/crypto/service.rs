//! CryptoService - High-level encryption API
//!
//! This module provides the main interface for end-to-end encryption in
//! SecureChat. It holds the local identity keys, resolves wrapped conversation
//! keys into per-session contexts and encrypts/decrypts message payloads.
//!
//! ## Example
//!
//! ```rust,ignore
//! use securechat_crypto::crypto::CryptoService;
//!
//! let service = CryptoService::new(user_id, config);
//! service.set_identity(key_pair).await;
//!
//! // Wrap a new conversation key for ourselves and a peer
//! let payload = service.initiate_session(&peer_id, &peer_public_key_b64).await?;
//!
//! // Once the transport delivers the persisted session
//! service.resolve_session(&session).await?;
//!
//! let outgoing = service.encrypt_outgoing(&session.id, "Hello!").await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::config::CryptoConfig;
use crate::crypto::aes::{self, SymmetricKey};
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::exchange::{self, SessionState};
use crate::crypto::keys::{AsymmetricKeyPair, AsymmetricPrivateKey, AsymmetricPublicKey};
use crate::models::{
    ChatMessage, ConversationSession, CreateSessionPayload, IdentityPublication, IncomingMessage,
    OutgoingMessage, SessionCreationRequest,
};

/// Capacity of the diagnostic event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Resolved key for one conversation
pub struct ConversationCryptoContext {
    session_id: String,
    key: SymmetricKey,
}

impl ConversationCryptoContext {
    /// Bind a resolved key to its session
    pub fn new(session_id: impl Into<String>, key: SymmetricKey) -> Self {
        Self {
            session_id: session_id.into(),
            key,
        }
    }

    /// Session this context belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Encrypt a message for this conversation
    pub fn encrypt_outgoing(&self, plaintext: &str) -> CryptoResult<OutgoingMessage> {
        let envelope = aes::encrypt(plaintext, &self.key)?;
        Ok(OutgoingMessage {
            session_id: self.session_id.clone(),
            ciphertext: envelope.ciphertext_base64(),
            nonce: envelope.nonce_base64(),
        })
    }

    /// Decrypt a base64 ciphertext/nonce pair for this conversation
    pub fn decrypt_incoming(&self, ciphertext_b64: &str, nonce_b64: &str) -> CryptoResult<String> {
        // Undecodable transport fields are treated like a failed tag check
        let ciphertext = STANDARD
            .decode(ciphertext_b64)
            .map_err(|_| CryptoError::AuthenticationFailure)?;
        let nonce = STANDARD
            .decode(nonce_b64)
            .map_err(|_| CryptoError::AuthenticationFailure)?;

        aes::decrypt(&ciphertext, &self.key, &nonce)
    }

    /// Exported key material (for equality checks between participants)
    pub fn export_key(&self) -> String {
        self.key.export()
    }
}

impl std::fmt::Debug for ConversationCryptoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationCryptoContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Diagnostic events that must not disappear silently
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoEvent {
    /// A session key was resolved locally
    SessionResolved { session_id: String },
    /// A message failed authentication or decoding and was rejected
    DecryptionFailed {
        session_id: String,
        sender_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    /// A message arrived before its session key and was queued
    MessageQueued { session_id: String, pending: usize },
    /// A message for an unresolved session was dropped because the queue
    /// (or the number of queued sessions) was at its limit
    MessageDropped { session_id: String, sender_id: String },
}

/// Result of handing an incoming message to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Decrypted and ready for display
    Decrypted(ChatMessage),
    /// Held until the session key is resolved
    Queued,
}

/// Local identity keys held in memory for the duration of the identity session
struct Identity {
    public: AsymmetricPublicKey,
    private: AsymmetricPrivateKey,
}

/// High-level encryption service
///
/// Thread-safe wrapper around all conversation crypto operations.
pub struct CryptoService {
    /// The local user id (selects which wrapped copy is ours)
    user_id: String,
    config: CryptoConfig,
    identity: RwLock<Option<Identity>>,
    /// Resolved contexts cache (session_id -> context)
    contexts: RwLock<HashMap<String, Arc<ConversationCryptoContext>>>,
    /// Key exchange progress per session
    states: RwLock<HashMap<String, SessionState>>,
    /// Messages waiting for their session key
    pending: Mutex<HashMap<String, VecDeque<IncomingMessage>>>,
    events: broadcast::Sender<CryptoEvent>,
}

impl CryptoService {
    /// Create a service for `user_id` without identity keys loaded
    pub fn new(user_id: impl Into<String>, config: CryptoConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            user_id: user_id.into(),
            config,
            identity: RwLock::new(None),
            contexts: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// The local user id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Active configuration
    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    /// Subscribe to diagnostic events
    pub fn subscribe(&self) -> broadcast::Receiver<CryptoEvent> {
        self.events.subscribe()
    }

    /// Install the local identity key pair
    pub async fn set_identity(&self, key_pair: &AsymmetricKeyPair) {
        let mut identity = self.identity.write().await;
        *identity = Some(Identity {
            public: key_pair.public_key(),
            private: key_pair.private_key(),
        });
        tracing::info!(
            user_id = %self.user_id,
            fingerprint = %key_pair.public_key().fingerprint(),
            "Loaded identity keys"
        );
    }

    /// Whether identity keys are loaded
    pub async fn has_identity(&self) -> bool {
        self.identity.read().await.is_some()
    }

    /// Our public key
    pub async fn public_key(&self) -> CryptoResult<AsymmetricPublicKey> {
        let identity = self.identity.read().await;
        identity
            .as_ref()
            .map(|i| i.public.clone())
            .ok_or(CryptoError::MissingLocalPublicKey)
    }

    /// Our public key in its published form
    pub async fn identity_publication(&self) -> CryptoResult<IdentityPublication> {
        self.public_key().await?.publication()
    }

    /// Get identity key fingerprint for verification
    pub async fn fingerprint(&self) -> CryptoResult<String> {
        Ok(self.public_key().await?.fingerprint())
    }

    /// Wrap a new conversation key for us (participant A) and `peer_id` (participant B)
    pub async fn initiate_session(
        &self,
        peer_id: &str,
        peer_public_key_b64: &str,
    ) -> CryptoResult<CreateSessionPayload> {
        let request = SessionCreationRequest {
            participant_a_public_key: self.public_key().await?.modulus_base64()?,
            participant_b_public_key: peer_public_key_b64.to_string(),
        };
        let wrapped = exchange::initiate_from_request(&request, self.config.wrap_encoding)?;

        tracing::info!(peer_id = %peer_id, "Created wrapped keys for new conversation");
        Ok(CreateSessionPayload {
            participant_a: self.user_id.clone(),
            participant_b: peer_id.to_string(),
            wrapped_key_for_a: wrapped.for_initiator,
            wrapped_key_for_b: wrapped.for_peer,
        })
    }

    /// Record a session whose key is wrapped but not yet resolved here
    pub async fn track_session(&self, session_id: &str) {
        let mut states = self.states.write().await;
        states
            .entry(session_id.to_string())
            .or_insert(SessionState::KeyWrapped);
    }

    /// Key exchange progress for a session
    pub async fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.states.read().await.get(session_id).copied()
    }

    /// Whether a session's key is resolved
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.contexts.read().await.contains_key(session_id)
    }

    /// Resolved context for a session
    pub async fn context(&self, session_id: &str) -> CryptoResult<Arc<ConversationCryptoContext>> {
        self.contexts
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CryptoError::SessionKeyUnresolved(session_id.to_string()))
    }

    /// Unwrap our copy of a session key and cache it
    ///
    /// Idempotent: an already resolved session is not decrypted again. Any
    /// messages queued for the session are decrypted and returned in arrival
    /// order; those that fail are reported through events and skipped.
    pub async fn resolve_session(&self, session: &ConversationSession) -> CryptoResult<Vec<ChatMessage>> {
        if !self.has_session(&session.id).await {
            let wrapped = session.wrapped_key_for(&self.user_id).ok_or_else(|| {
                CryptoError::MalformedWrappedKey(format!(
                    "session {} has no key for user {}",
                    session.id, self.user_id
                ))
            })?;

            let key = {
                let identity = self.identity.read().await;
                let identity = identity.as_ref().ok_or(CryptoError::MissingLocalPrivateKey)?;
                exchange::resolve_session(wrapped, &identity.private, self.config.wrap_encoding)?
            };

            let mut contexts = self.contexts.write().await;
            contexts
                .entry(session.id.clone())
                .or_insert_with(|| Arc::new(ConversationCryptoContext::new(session.id.clone(), key)));
            drop(contexts);

            let mut states = self.states.write().await;
            let state = states
                .entry(session.id.clone())
                .or_insert(SessionState::KeyWrapped);
            *state = state.on_local_resolved();
            drop(states);

            tracing::info!(session_id = %session.id, "Resolved session key");
            let _ = self.events.send(CryptoEvent::SessionResolved {
                session_id: session.id.clone(),
            });
        }

        self.drain_pending(&session.id).await
    }

    /// Encrypt a message for a resolved session
    pub async fn encrypt_outgoing(&self, session_id: &str, plaintext: &str) -> CryptoResult<OutgoingMessage> {
        let context = self.context(session_id).await?;
        context.encrypt_outgoing(plaintext)
    }

    /// Decrypt a pushed message, queueing it if the session is not resolved yet
    pub async fn decrypt_incoming(&self, message: IncomingMessage) -> CryptoResult<Inbound> {
        let context = match self.context(&message.session_id).await {
            Ok(context) => context,
            Err(CryptoError::SessionKeyUnresolved(_)) => {
                return self.enqueue(message).await;
            }
            Err(e) => return Err(e),
        };

        self.decrypt_with(&context, &message).await.map(Inbound::Decrypted)
    }

    async fn decrypt_with(
        &self,
        context: &ConversationCryptoContext,
        message: &IncomingMessage,
    ) -> CryptoResult<ChatMessage> {
        match context.decrypt_incoming(&message.ciphertext, &message.nonce) {
            Ok(content) => {
                if message.sender_id != self.user_id {
                    let mut states = self.states.write().await;
                    if let Some(state) = states.get_mut(&message.session_id) {
                        *state = state.on_peer_proved_key();
                    }
                }

                Ok(ChatMessage {
                    session_id: message.session_id.clone(),
                    sender_id: message.sender_id.clone(),
                    content,
                    received_at: Utc::now(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %message.session_id,
                    sender_id = %message.sender_id,
                    error = %e,
                    "Rejected incoming message"
                );
                let _ = self.events.send(CryptoEvent::DecryptionFailed {
                    session_id: message.session_id.clone(),
                    sender_id: message.sender_id.clone(),
                    reason: e.to_string(),
                    at: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn enqueue(&self, message: IncomingMessage) -> CryptoResult<Inbound> {
        let mut pending = self.pending.lock().await;

        // resolve_session inserts the context before it drains, so a context
        // seen under the pending lock means the drain may already be over
        let resolved = self.contexts.read().await.get(&message.session_id).cloned();
        if let Some(context) = resolved {
            drop(pending);
            return self.decrypt_with(&context, &message).await.map(Inbound::Decrypted);
        }

        let known = pending.contains_key(&message.session_id);
        if !known && pending.len() >= self.config.max_pending_sessions {
            drop(pending);
            return Err(self.drop_message(message, "too many unresolved sessions"));
        }

        let queue = pending.entry(message.session_id.clone()).or_default();
        if queue.len() >= self.config.pending_queue_capacity {
            drop(pending);
            return Err(self.drop_message(message, "queue full"));
        }

        let session_id = message.session_id.clone();
        queue.push_back(message);
        let depth = queue.len();

        tracing::debug!(session_id = %session_id, pending = depth, "Queued message for unresolved session");
        let _ = self.events.send(CryptoEvent::MessageQueued {
            session_id,
            pending: depth,
        });
        Ok(Inbound::Queued)
    }

    fn drop_message(&self, message: IncomingMessage, reason: &str) -> CryptoError {
        tracing::warn!(
            session_id = %message.session_id,
            sender_id = %message.sender_id,
            "Dropped message for unresolved session: {}",
            reason
        );
        let _ = self.events.send(CryptoEvent::MessageDropped {
            session_id: message.session_id.clone(),
            sender_id: message.sender_id,
        });
        CryptoError::PendingQueueFull(message.session_id)
    }

    async fn drain_pending(&self, session_id: &str) -> CryptoResult<Vec<ChatMessage>> {
        let queued = {
            let mut pending = self.pending.lock().await;
            pending.remove(session_id).unwrap_or_default()
        };
        if queued.is_empty() {
            return Ok(Vec::new());
        }

        let context = self.context(session_id).await?;
        let mut delivered = Vec::with_capacity(queued.len());
        for message in queued {
            // Failures are already logged and emitted by decrypt_with
            if let Ok(chat) = self.decrypt_with(&context, &message).await {
                delivered.push(chat);
            }
        }

        tracing::info!(session_id = %session_id, delivered = delivered.len(), "Delivered queued messages");
        Ok(delivered)
    }

    /// Number of messages waiting for a session key
    pub async fn pending_count(&self, session_id: &str) -> usize {
        self.pending
            .lock()
            .await
            .get(session_id)
            .map_or(0, VecDeque::len)
    }

    /// Forget a single session (explicit conversation reset)
    pub async fn delete_session(&self, session_id: &str) {
        self.contexts.write().await.remove(session_id);
        self.states.write().await.remove(session_id);
        self.pending.lock().await.remove(session_id);
    }

    /// Discard every context, queued message and the in-memory identity (for logout)
    pub async fn logout(&self) {
        self.contexts.write().await.clear();
        self.states.write().await.clear();
        self.pending.lock().await.clear();
        *self.identity.write().await = None;
        tracing::info!(user_id = %self.user_id, "Cleared conversation keys");
    }
}
