//! HTTP Backend Implementation
//!
//! Talks to the chorus backend over HTTP with `reqwest`.
//!
//! # Endpoints
//!
//! - `POST /api/summarize` - multiplexed provider stream (`data: <json>\n\n` records)
//! - `GET /api/sessions` - session list
//! - `GET /api/sessions/{id}` - turns of one session
//!
//! The summarize request carries no overall timeout: a stream lasts as long
//! as the providers keep writing. History calls use `request_timeout`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::traits::{ByteStream, ChatBackend, CredentialProvider, SummarizeRequest};
use crate::config::BackendSettings;
use crate::messages::SessionId;
use crate::session::{ChatTurn, Session};
use crate::transport::{error_message_from_body, TransportError};

/// HTTP backend client
#[derive(Clone)]
pub struct HttpBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// Timeout for the history calls
    request_timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
    /// Bearer token source
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpBackend {
    /// Create a backend for `base_url`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            http_client,
            credentials,
        })
    }

    /// Create from the `[backend]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn from_settings(
        settings: &BackendSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, TransportError> {
        Self::new(
            settings.base_url.clone(),
            Duration::from_secs(settings.connect_timeout_secs),
            Duration::from_secs(settings.request_timeout_secs),
            credentials,
        )
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn summarize_url(&self) -> String {
        format!("{}/api/summarize", self.base_url)
    }

    fn sessions_url(&self) -> String {
        format!("{}/api/sessions", self.base_url)
    }

    fn session_url(&self, id: SessionId) -> String {
        format!("{}/api/sessions/{id}", self.base_url)
    }

    /// Attach the bearer token, if there is one
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn a non-success response into a `TransportError::Status`
    async fn status_error(response: Response) -> TransportError {
        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        let message = error_message_from_body(&body);
        warn!(status = status.as_u16(), message = %message, "Backend returned an error");
        TransportError::Status {
            status: status.as_u16(),
            message,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, TransportError> {
        let response = self
            .authorize(self.http_client.get(&url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn summarize(&self, request: &SummarizeRequest) -> Result<ByteStream, TransportError> {
        debug!(url = %self.summarize_url(), models = ?request.models, "Opening summarize stream");

        let response = self
            .authorize(self.http_client.post(self.summarize_url()))
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(response).await);
        }

        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
            || response.content_length() == Some(0)
        {
            warn!(status = status.as_u16(), "Summarize response has no body");
            return Err(TransportError::MissingBody);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::Read(e.to_string()))
            })
            .boxed();

        Ok(stream)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, TransportError> {
        self.get_json(self.sessions_url()).await
    }

    async fn load_session(&self, id: SessionId) -> Result<Vec<ChatTurn>, TransportError> {
        self.get_json(self.session_url(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticCredentials;

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(
            base_url,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Arc::new(StaticCredentials::anonymous()),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let backend = backend("http://localhost:5050/");
        assert_eq!(backend.base_url(), "http://localhost:5050");
        assert_eq!(backend.summarize_url(), "http://localhost:5050/api/summarize");
        assert_eq!(backend.sessions_url(), "http://localhost:5050/api/sessions");
        assert_eq!(
            backend.session_url(SessionId(12)),
            "http://localhost:5050/api/sessions/12"
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = BackendSettings {
            base_url: "https://chorus.example".to_string(),
            ..BackendSettings::default()
        };
        let backend =
            HttpBackend::from_settings(&settings, Arc::new(StaticCredentials::anonymous()))
                .unwrap();
        assert_eq!(backend.base_url(), "https://chorus.example");
        assert_eq!(backend.name(), "HTTP");
    }
}
