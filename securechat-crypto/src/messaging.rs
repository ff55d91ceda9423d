//! Message pipeline
//!
//! Glue between a [`Connection`] and the [`CryptoService`]: outgoing text is
//! encrypted before it reaches the transport, pushed sessions are resolved and
//! pushed messages are decrypted before they reach the caller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{CryptoError, CryptoService, Inbound};
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, ConversationSession, CreateSessionPayload, OutgoingMessage};
use crate::transport::{ClientFrame, Connection, ServerEvent};

/// Chat client for one signed-in user
pub struct ChatClient {
    crypto: Arc<CryptoService>,
    /// Sessions delivered by the server (session_id -> session)
    sessions: HashMap<String, ConversationSession>,
}

impl ChatClient {
    pub fn new(crypto: Arc<CryptoService>) -> Self {
        Self {
            crypto,
            sessions: HashMap::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        self.crypto.user_id()
    }

    pub fn crypto(&self) -> &Arc<CryptoService> {
        &self.crypto
    }

    /// Sessions known to this client
    pub fn sessions(&self) -> impl Iterator<Item = &ConversationSession> {
        self.sessions.values()
    }

    /// Connect and authenticate, waiting for the server's verdict
    pub async fn authenticate(&self, conn: &mut Connection, token: &str) -> AppResult<()> {
        conn.connect()?;
        conn.send(&ClientFrame::Auth {
            token: token.to_string(),
        })
        .await?;

        loop {
            match conn.next_event().await? {
                Some(ServerEvent::AuthSuccess) => return Ok(()),
                Some(ServerEvent::AuthError { message }) => {
                    return Err(AppError::Transport(format!(
                        "authentication rejected: {}",
                        message
                    )))
                }
                Some(other) => {
                    tracing::warn!("Ignoring event before authentication: {:?}", other);
                }
                None => return Err(AppError::NotConnected),
            }
        }
    }

    /// Wrap a new conversation key for us and `peer_id` and ask the server to persist it
    pub async fn create_conversation(
        &self,
        conn: &mut Connection,
        peer_id: &str,
        peer_public_key: &str,
    ) -> AppResult<CreateSessionPayload> {
        if !conn.is_authenticated() {
            return Err(AppError::NotAuthenticated);
        }

        let payload = self
            .crypto
            .initiate_session(peer_id, peer_public_key)
            .await
            .map_err(|e| session_creation_error(peer_id, e))?;

        conn.send(&ClientFrame::CreateChatSession(payload.clone()))
            .await?;
        tracing::info!("Requested conversation with {}", peer_id);
        Ok(payload)
    }

    /// Encrypt and send a message on a resolved session
    pub async fn send_message(
        &self,
        conn: &mut Connection,
        session_id: &str,
        text: &str,
    ) -> AppResult<OutgoingMessage> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| CryptoError::SessionKeyUnresolved(session_id.to_string()))?;
        let receiver_id = session
            .peer_of(self.user_id())
            .ok_or_else(|| AppError::Transport(format!("not a participant of session {}", session_id)))?
            .to_string();

        let message = self.crypto.encrypt_outgoing(session_id, text).await?;
        conn.send(&ClientFrame::SendMessage {
            sender_id: self.user_id().to_string(),
            receiver_id,
            message: message.clone(),
        })
        .await?;

        Ok(message)
    }

    /// Apply one server event, returning any messages now ready for display
    pub async fn handle_event(&mut self, event: ServerEvent) -> AppResult<Vec<ChatMessage>> {
        match event {
            ServerEvent::NewChatSession(session) => {
                let session_id = session.id.clone();
                self.crypto.track_session(&session_id).await;
                let delivered = self.crypto.resolve_session(&session).await?;
                self.sessions.insert(session_id, session);
                Ok(delivered)
            }
            ServerEvent::NewMessage(message) => match self.crypto.decrypt_incoming(message).await? {
                Inbound::Decrypted(chat) => Ok(vec![chat]),
                Inbound::Queued => Ok(Vec::new()),
            },
            ServerEvent::SessionError { message } => Err(AppError::SessionCreation(message)),
            ServerEvent::AuthSuccess | ServerEvent::AuthError { .. } => Ok(Vec::new()),
        }
    }

    /// Wait for the next event on `conn` and apply it
    ///
    /// Returns `None` once the transport is gone.
    pub async fn next_messages(&mut self, conn: &mut Connection) -> AppResult<Option<Vec<ChatMessage>>> {
        match conn.next_event().await? {
            Some(event) => self.handle_event(event).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop every session and key held for this user
    pub async fn logout(&mut self, conn: &mut Connection) {
        self.sessions.clear();
        self.crypto.logout().await;
        conn.disconnect();
    }
}

fn session_creation_error(peer_id: &str, error: CryptoError) -> AppError {
    match error {
        CryptoError::InvalidKey(_)
        | CryptoError::InvalidEncoding(_)
        | CryptoError::MessageTooLargeForModulus { .. } => AppError::SessionCreation(format!(
            "public key of {} is unusable ({}); ask them to republish their identity",
            peer_id, error
        )),
        CryptoError::MissingLocalPublicKey => AppError::SessionCreation(
            "no local identity key is loaded; sign in again to restore it".to_string(),
        ),
        other => AppError::Crypto(other),
    }
}
