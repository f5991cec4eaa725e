//! Wire Protocol for the Summarize Stream
//!
//! The backend answers `POST /api/summarize` with a byte stream of records:
//!
//! ```text
//! data: {"provider":"gemini","chunk":"Hel"}\n\n
//! data: {"provider":"deepseek","chunk":"Hi"}\n\n
//! data: {"final":{"session_id":7,"turn_id":42,"created_at":"...","prompt":"X"}}\n\n
//! ```
//!
//! Network deliveries can split anywhere, including inside a multi-byte UTF-8
//! sequence or inside a JSON document. [`Utf8Decoder`] carries incomplete
//! byte sequences and [`FrameParser`] carries incomplete records across
//! deliveries.
//!
//! This module is pure: no I/O, no async. The byte source is driven by
//! [`crate::streaming::FrameStream`].

pub mod frame;
pub mod utf8;

use thiserror::Error;

pub use frame::{
    parse_record, split_records, Completion, Frame, FrameBatch, FrameError, FrameParser,
    DATA_PREFIX, RECORD_SEPARATOR,
};
pub use utf8::Utf8Decoder;

/// Message used when the backend gives no usable error text
pub const GENERIC_FAILURE_MESSAGE: &str = "Request failed.";

/// Message used when the backend error document carries no message field
pub const UNSPECIFIED_FAILURE_MESSAGE: &str = "Something went wrong.";

/// Errors from the HTTP exchange with the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-success HTTP status
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message resolved from the error body
        message: String,
    },

    /// Success status but nothing to stream
    #[error("response has no readable body")]
    MissingBody,

    /// The request could not be sent
    #[error("request failed: {0}")]
    Request(String),

    /// Reading the body failed mid-stream
    #[error("stream read failed: {0}")]
    Read(String),

    /// The body ended before the completion frame
    #[error("stream ended before the completion frame")]
    Truncated,

    /// A JSON response could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Short text suitable for the user-visible notice
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            Self::MissingBody => GENERIC_FAILURE_MESSAGE.to_string(),
            Self::Request(e) | Self::Read(e) | Self::Decode(e) => e.clone(),
            Self::Truncated => "The response ended before it was complete.".to_string(),
        }
    }
}

/// Resolve a human-readable message from an error response body
///
/// - a JSON string is used as-is
/// - a JSON object's non-empty `message` (or `error`) field is used
/// - any other JSON document yields [`UNSPECIFIED_FAILURE_MESSAGE`]
/// - a body that is not JSON yields [`GENERIC_FAILURE_MESSAGE`]
#[must_use]
pub fn error_message_from_body(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return GENERIC_FAILURE_MESSAGE.to_string();
    };

    match value {
        serde_json::Value::String(message) if !message.is_empty() => message,
        serde_json::Value::Object(map) => ["message", "error"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(serde_json::Value::as_str))
            .find(|message| !message.is_empty())
            .map_or_else(|| UNSPECIFIED_FAILURE_MESSAGE.to_string(), str::to_string),
        _ => UNSPECIFIED_FAILURE_MESSAGE.to_string(),
    }
}
