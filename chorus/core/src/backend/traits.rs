//! Chat Backend Traits
//!
//! Trait definitions for the summarize backend. The Conductor talks to the
//! backend only through [`ChatBackend`], so tests and alternative transports
//! can stand in for the HTTP implementation.
//!
//! # Design Philosophy
//!
//! The backend trait covers three calls:
//! - Opening the multiplexed summarize stream
//! - Listing sessions
//! - Replaying one session's turns
//!
//! Credential acquisition is somebody else's job; [`CredentialProvider`] is
//! the seam where a token is handed in.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::messages::SessionId;
use crate::session::{ChatTurn, Session};
use crate::transport::TransportError;

/// Raw body deliveries from the backend
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Payload for `POST /api/summarize`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    /// The prompt to fan out
    pub prompt: String,
    /// Providers to query
    pub models: Vec<String>,
    /// Session to continue (`null` starts a new one)
    #[serde(rename = "chatSession")]
    pub chat_session: Option<SessionId>,
    /// Provider that writes the combined answer
    pub summary_model: String,
    /// Hide provider names from the summarizer
    pub llm_anonymous: bool,
}

impl SummarizeRequest {
    /// Create a request with the default summarizer settings
    pub fn new(prompt: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            models,
            chat_session: None,
            summary_model: "gemini".to_string(),
            llm_anonymous: true,
        }
    }

    /// Continue an existing session
    #[must_use]
    pub fn with_session(mut self, session: Option<SessionId>) -> Self {
        self.chat_session = session;
        self
    }

    /// Set the summarizer provider
    #[must_use]
    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = model.into();
        self
    }

    /// Set provider anonymity for the summarizer
    #[must_use]
    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.llm_anonymous = anonymous;
        self
    }
}

/// Chat backend trait
///
/// Implement this trait to plug in a different transport.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get the backend name (e.g., "HTTP")
    fn name(&self) -> &str;

    /// Issue one summarize exchange
    ///
    /// On success the caller owns the body stream. A non-success status or a
    /// missing body is reported here, before any streaming starts.
    async fn summarize(&self, request: &SummarizeRequest) -> Result<ByteStream, TransportError>;

    /// List sessions, most relevant first
    async fn list_sessions(&self) -> Result<Vec<Session>, TransportError>;

    /// Replay a session's turns in order
    async fn load_session(&self, id: SessionId) -> Result<Vec<ChatTurn>, TransportError>;
}

/// Source of bearer tokens for backend requests
pub trait CredentialProvider: Send + Sync {
    /// Current token, if signed in
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token from configuration
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    /// Use the given token for every request
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Send requests without an `Authorization` header
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build from an optional configured token; blank tokens count as none
    #[must_use]
    pub fn from_option(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}
