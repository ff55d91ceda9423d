//! Connection handle between the crypto core and the realtime transport
//!
//! The core never owns a socket. It holds a [`Connection`] whose frames are
//! JSON strings on bounded channels; the external transport owns the matching
//! [`RemoteEnd`] and pumps frames to and from the server.
//!
//! ```text
//! Disconnected --connect--> Connected --auth_success--> Authenticated
//!       ^                        |                            |
//!       +-------disconnect-------+----------------------------+
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};
use crate::models::{ConversationSession, CreateSessionPayload, IncomingMessage, OutgoingMessage};

/// Frames sent by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        token: String,
    },
    CreateChatSession(CreateSessionPayload),
    SendMessage {
        sender_id: String,
        receiver_id: String,
        message: OutgoingMessage,
    },
}

impl ClientFrame {
    fn requires_auth(&self) -> bool {
        !matches!(self, ClientFrame::Auth { .. })
    }
}

/// Events pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthSuccess,
    AuthError { message: String },
    NewChatSession(ConversationSession),
    NewMessage(IncomingMessage),
    SessionError { message: String },
}

/// Lifecycle of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Authenticated,
}

/// Core-side handle
pub struct Connection {
    state: ConnectionState,
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
}

/// Transport-side handle
pub struct RemoteEnd {
    outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<String>,
}

impl Connection {
    /// Create a connected pair of handles with `capacity` frames buffered per direction
    pub fn pair(capacity: usize) -> (Connection, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
        let (in_tx, in_rx) = mpsc::channel(capacity.max(1));

        let connection = Connection {
            state: ConnectionState::Disconnected,
            outbound: out_tx,
            inbound: in_rx,
        };
        let remote = RemoteEnd {
            outbound: out_rx,
            inbound: in_tx,
        };
        (connection, remote)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Mark the transport as up
    pub fn connect(&mut self) -> AppResult<()> {
        if self.outbound.is_closed() {
            return Err(AppError::NotConnected);
        }
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connected;
            tracing::info!("Connected to chat transport");
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            tracing::info!("Disconnected from chat transport");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send a frame to the server
    pub async fn send(&mut self, frame: &ClientFrame) -> AppResult<()> {
        match self.state {
            ConnectionState::Disconnected => return Err(AppError::NotConnected),
            ConnectionState::Connected if frame.requires_auth() => {
                return Err(AppError::NotAuthenticated)
            }
            _ => {}
        }

        let json = serde_json::to_string(frame)?;
        if self.outbound.send(json).await.is_err() {
            self.state = ConnectionState::Disconnected;
            return Err(AppError::Transport("transport closed".to_string()));
        }
        Ok(())
    }

    /// Wait for the next server event
    ///
    /// Returns `None` once the transport side is gone. Authentication results
    /// update the connection state before being returned.
    pub async fn next_event(&mut self) -> AppResult<Option<ServerEvent>> {
        let Some(json) = self.inbound.recv().await else {
            self.disconnect();
            return Ok(None);
        };

        let event: ServerEvent = serde_json::from_str(&json)?;
        match &event {
            ServerEvent::AuthSuccess => {
                self.state = ConnectionState::Authenticated;
                tracing::info!("Authenticated with chat transport");
            }
            ServerEvent::AuthError { message } => {
                self.state = ConnectionState::Connected;
                tracing::warn!("Transport authentication rejected: {}", message);
            }
            _ => {}
        }
        Ok(Some(event))
    }
}

impl RemoteEnd {
    /// Next raw frame from the client
    pub async fn recv_raw(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next frame from the client, decoded
    pub async fn recv_frame(&mut self) -> AppResult<Option<ClientFrame>> {
        match self.outbound.recv().await {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Deliver a raw server frame to the client
    pub async fn push_raw(&self, json: String) -> AppResult<()> {
        self.inbound
            .send(json)
            .await
            .map_err(|_| AppError::Transport("client handle dropped".to_string()))
    }

    /// Deliver a server event to the client
    pub async fn push(&self, event: &ServerEvent) -> AppResult<()> {
        self.push_raw(serde_json::to_string(event)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let json = serde_json::to_value(ClientFrame::Auth {
            token: "t".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "auth");
        assert_eq!(json["data"]["token"], "t");

        let event: ServerEvent = serde_json::from_str(r#"{"event":"auth_success"}"#).unwrap();
        assert_eq!(event, ServerEvent::AuthSuccess);

        let event: ServerEvent = serde_json::from_str(
            r#"{"event":"new_message","data":{"sessionId":"1","senderId":"2","ciphertext":"Yw==","nonce":"bg=="}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::NewMessage(m) if m.sender_id == "2"));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (mut conn, mut remote) = Connection::pair(8);
        let frame = ClientFrame::SendMessage {
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            message: OutgoingMessage {
                session_id: "1".to_string(),
                ciphertext: "Yw==".to_string(),
                nonce: "bg==".to_string(),
            },
        };

        assert!(matches!(conn.send(&frame).await, Err(AppError::NotConnected)));

        conn.connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(matches!(conn.send(&frame).await, Err(AppError::NotAuthenticated)));

        conn.send(&ClientFrame::Auth { token: "t".to_string() }).await.unwrap();
        assert!(matches!(
            remote.recv_frame().await.unwrap(),
            Some(ClientFrame::Auth { .. })
        ));

        remote.push(&ServerEvent::AuthSuccess).await.unwrap();
        conn.next_event().await.unwrap();
        assert!(conn.is_authenticated());

        conn.send(&frame).await.unwrap();
        assert_eq!(remote.recv_frame().await.unwrap(), Some(frame));

        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_auth_error_keeps_connection_unauthenticated() {
        let (mut conn, remote) = Connection::pair(4);
        conn.connect().unwrap();
        remote
            .push(&ServerEvent::AuthError {
                message: "bad token".to_string(),
            })
            .await
            .unwrap();

        let event = conn.next_event().await.unwrap();
        assert!(matches!(event, Some(ServerEvent::AuthError { .. })));
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_remote_drop_disconnects() {
        let (mut conn, remote) = Connection::pair(4);
        conn.connect().unwrap();
        drop(remote);

        assert!(conn.next_event().await.unwrap().is_none());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(conn.connect(), Err(AppError::NotConnected)));
    }

    #[tokio::test]
    async fn test_malformed_event_is_json_error() {
        let (mut conn, remote) = Connection::pair(4);
        conn.connect().unwrap();
        remote.push_raw("{\"event\":\"bogus\"}".to_string()).await.unwrap();
        assert!(matches!(conn.next_event().await, Err(AppError::Json(_))));
    }
}
