//! Conversation Data Model
//!
//! Sessions, turns and per-provider responses. A session is a backend-owned
//! grouping of turns; the core only reads its id. Turns are built live by the
//! streaming engine or replayed from history, and both paths produce the same
//! shape.
//!
//! # Turn Identity
//!
//! A turn starts with a client-generated placeholder id and is committed to the
//! server-issued id exactly once. [`TurnIdentity`] makes that a tagged variant
//! instead of one overloaded integer, so a committed turn cannot be committed
//! again by accident.

use serde::{Deserialize, Serialize};

use crate::messages::{SessionId, TempTurnId, TurnId};
use crate::reconcile::ReconcileError;

/// Summary of a backend session, as listed by `GET /api/sessions`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// Last activity timestamp (RFC 3339)
    #[serde(default)]
    pub last_used: Option<String>,
}

/// Identity of a turn over its lifetime
///
/// On the wire both variants are a bare integer. Records coming from the
/// backend are always committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum TurnIdentity {
    /// Placeholder assigned when the send began
    Pending(TempTurnId),
    /// Server-issued id
    Committed(TurnId),
}

impl TurnIdentity {
    /// Swap a pending identity for the committed one
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::AlreadyCommitted` if the identity is already final.
    pub fn commit(self, id: TurnId) -> Result<Self, ReconcileError> {
        match self {
            Self::Pending(_) => Ok(Self::Committed(id)),
            Self::Committed(existing) => Err(ReconcileError::AlreadyCommitted(existing)),
        }
    }

    /// Check if this is still a placeholder
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The committed id, if any
    #[must_use]
    pub fn committed(&self) -> Option<TurnId> {
        match self {
            Self::Committed(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }

    /// Raw integer value
    #[must_use]
    pub fn value(&self) -> i64 {
        match self {
            Self::Pending(id) => id.0,
            Self::Committed(id) => id.0,
        }
    }
}

impl From<TurnIdentity> for i64 {
    fn from(identity: TurnIdentity) -> Self {
        identity.value()
    }
}

impl From<i64> for TurnIdentity {
    fn from(value: i64) -> Self {
        Self::Committed(TurnId(value))
    }
}

impl From<TurnId> for TurnIdentity {
    fn from(id: TurnId) -> Self {
        Self::Committed(id)
    }
}

impl From<TempTurnId> for TurnIdentity {
    fn from(id: TempTurnId) -> Self {
        Self::Pending(id)
    }
}

impl std::fmt::Display for TurnIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending(id) => write!(f, "{id}"),
            Self::Committed(id) => write!(f, "{id}"),
        }
    }
}

/// One provider's answer within a turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Provider key, unique within the turn
    pub provider: String,
    /// Concatenation of every chunk received for this provider, in order
    pub content: String,
}

impl ProviderResponse {
    /// Create a response entry
    pub fn new(provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            content: content.into(),
        }
    }
}

/// One prompt submission and its provider answers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Placeholder or final identity
    pub turn_id: TurnIdentity,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// The prompt as submitted
    pub prompt: String,
    /// Responses in first-chunk-arrival order
    #[serde(default)]
    pub responses: Vec<ProviderResponse>,
}

impl ChatTurn {
    /// Create a placeholder turn with no responses
    pub fn pending(
        temp_id: TempTurnId,
        prompt: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            turn_id: TurnIdentity::Pending(temp_id),
            created_at: created_at.into(),
            prompt: prompt.into(),
            responses: Vec::new(),
        }
    }

    /// Look up a provider's response
    #[must_use]
    pub fn response(&self, provider: &str) -> Option<&ProviderResponse> {
        self.responses.iter().find(|r| r.provider == provider)
    }

    /// Provider keys in insertion order
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.responses.iter().map(|r| r.provider.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commit_swaps_pending_identity() {
        let identity = TurnIdentity::Pending(TempTurnId(1_700_000_000_000));
        let committed = identity.commit(TurnId(42)).unwrap();
        assert_eq!(committed, TurnIdentity::Committed(TurnId(42)));
        assert!(!committed.is_pending());
    }

    #[test]
    fn test_commit_twice_is_rejected() {
        let committed = TurnIdentity::Committed(TurnId(42));
        assert_eq!(
            committed.commit(TurnId(43)),
            Err(ReconcileError::AlreadyCommitted(TurnId(42)))
        );
    }

    #[test]
    fn test_history_record_deserializes_as_committed() {
        let json = r#"{
            "turn_id": 42,
            "created_at": "2024-01-01T00:00:00Z",
            "prompt": "X",
            "responses": [
                {"provider": "gemini", "content": "Hello"},
                {"provider": "deepseek", "content": "Hi"}
            ]
        }"#;
        let turn: ChatTurn = serde_json::from_str(json).unwrap();
        assert_eq!(turn.turn_id, TurnIdentity::Committed(TurnId(42)));
        assert_eq!(turn.providers().collect::<Vec<_>>(), vec!["gemini", "deepseek"]);
        assert_eq!(turn.response("deepseek").unwrap().content, "Hi");
        assert!(turn.response("summarizer").is_none());
    }

    #[test]
    fn test_turn_serializes_identity_as_integer() {
        let turn = ChatTurn::pending(TempTurnId(99), "hi", "2024-01-01T00:00:00Z");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["turn_id"], serde_json::json!(99));
        assert_eq!(value["responses"], serde_json::json!([]));
    }

    #[test]
    fn test_session_without_last_used() {
        let session: Session = serde_json::from_str(r#"{"id": 3, "title": "Chat"}"#).unwrap();
        assert_eq!(session.id, SessionId(3));
        assert_eq!(session.last_used, None);
    }
}
