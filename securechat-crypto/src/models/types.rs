//! Payload shapes exchanged with the transport layer
//!
//! Everything here is opaque base64 text as far as the transport is concerned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identity Types
// ============================================================================

/// Public identity key as published to the key directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPublication {
    /// Fixed-width base64 of the modulus
    pub public_key: String,
    /// Always 65537
    pub exponent: u32,
}

// ============================================================================
// Session Types
// ============================================================================

/// Public keys of both participants, input to session creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreationRequest {
    pub participant_a_public_key: String,
    pub participant_b_public_key: String,
}

/// New session handed to the transport for persistence and delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionPayload {
    pub participant_a: String,
    pub participant_b: String,
    pub wrapped_key_for_a: String,
    pub wrapped_key_for_b: String,
}

/// A persisted conversation session as delivered back by the transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    /// Session key wrapped under participant A's public key
    pub wrapped_key_for_a: String,
    /// Session key wrapped under participant B's public key
    pub wrapped_key_for_b: String,
}

impl ConversationSession {
    /// The wrapped copy addressed to `user_id`, if they take part
    pub fn wrapped_key_for(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.wrapped_key_for_a)
        } else if self.participant_b == user_id {
            Some(&self.wrapped_key_for_b)
        } else {
            None
        }
    }

    /// The other participant from `user_id`'s point of view
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Encrypted message on its way to the transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub session_id: String,
    /// Base64 ciphertext with tag
    pub ciphertext: String,
    /// Base64 12-byte nonce
    pub nonce: String,
}

/// Encrypted message pushed by the transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub session_id: String,
    pub sender_id: String,
    pub ciphertext: String,
    pub nonce: String,
}

/// Decrypted message ready for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub session_id: String,
    pub sender_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ConversationSession {
        ConversationSession {
            id: "7".to_string(),
            participant_a: "alice".to_string(),
            participant_b: "bob".to_string(),
            wrapped_key_for_a: "AAAA".to_string(),
            wrapped_key_for_b: "BBBB".to_string(),
        }
    }

    #[test]
    fn test_wrapped_key_lookup() {
        let session = session();
        assert_eq!(session.wrapped_key_for("alice"), Some("AAAA"));
        assert_eq!(session.wrapped_key_for("bob"), Some("BBBB"));
        assert_eq!(session.wrapped_key_for("mallory"), None);
        assert_eq!(session.peer_of("alice"), Some("bob"));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = serde_json::to_value(session()).unwrap();
        assert_eq!(json["wrappedKeyForA"], "AAAA");
        assert_eq!(json["participantB"], "bob");

        let incoming: IncomingMessage = serde_json::from_str(
            r#"{"sessionId":"7","senderId":"bob","ciphertext":"Y3Q=","nonce":"bm9uY2U="}"#,
        )
        .unwrap();
        assert_eq!(incoming.sender_id, "bob");
    }
}
