//! Frame Protocol
//!
//! Text-level parsing of the summarize stream into event frames.
//!
//! # Record Format
//!
//! ```text
//! data: <json>\n\n
//! ```
//!
//! Records are separated by a blank line. Only records that start with the
//! literal `data: ` marker are frames; anything else (comments, keep-alives,
//! stray whitespace) is noise and dropped.
//!
//! # Failure Policy
//!
//! A frame whose body is not JSON, or is JSON of an unknown shape, halts the
//! parser. Frames completed before it in the same delivery are still returned.
//! Skipping would hide backend protocol bugs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{SessionId, TurnId};

/// Marker that introduces a frame record
pub const DATA_PREFIX: &str = "data: ";

/// Blank-line boundary between records
pub const RECORD_SEPARATOR: &str = "\n\n";

/// Longest record excerpt kept in error values
const MAX_ERROR_EXCERPT: usize = 256;

/// Body of the completion frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Session the backend filed the turn under
    pub session_id: SessionId,
    /// Final turn id
    pub turn_id: TurnId,
    /// Server timestamp for the turn
    pub created_at: String,
    /// Prompt as recorded by the backend
    #[serde(default)]
    pub prompt: String,
}

/// One event frame of the summarize stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// `{"final": {...}}`, exactly one, last
    Completion {
        /// The authoritative turn record
        #[serde(rename = "final")]
        completion: Completion,
    },
    /// `{"provider": ..., "chunk": ...}`
    Content {
        /// Provider key
        provider: String,
        /// Text to append to that provider's answer
        chunk: String,
    },
}

impl Frame {
    /// Build a content frame
    pub fn content(provider: impl Into<String>, chunk: impl Into<String>) -> Self {
        Self::Content {
            provider: provider.into(),
            chunk: chunk.into(),
        }
    }

    /// Check if this is the completion frame
    #[must_use]
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Completion { .. })
    }
}

/// Fatal parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A `data:` record did not hold a recognized JSON document
    #[error("malformed frame: {reason}")]
    Malformed {
        /// The offending record (truncated)
        record: String,
        /// Parser diagnostic
        reason: String,
    },

    /// The parser already failed and produces no more frames
    #[error("frame parser halted after an earlier malformed frame")]
    Halted,
}

impl FrameError {
    fn malformed(record: &str, reason: impl Into<String>) -> Self {
        let mut excerpt: String = record.chars().take(MAX_ERROR_EXCERPT).collect();
        if excerpt.len() < record.len() {
            excerpt.push('…');
        }
        Self::Malformed {
            record: excerpt,
            reason: reason.into(),
        }
    }
}

/// Split `carry + fragment` on record boundaries
///
/// Returns the complete records and the trailing, possibly incomplete, text
/// that must be carried into the next call.
#[must_use]
pub fn split_records(carry: &str, fragment: &str) -> (Vec<String>, String) {
    let mut buffer = String::with_capacity(carry.len() + fragment.len());
    buffer.push_str(carry);
    buffer.push_str(fragment);

    let mut records = Vec::new();
    let mut rest = buffer.as_str();
    while let Some(pos) = rest.find(RECORD_SEPARATOR) {
        records.push(rest[..pos].to_string());
        rest = &rest[pos + RECORD_SEPARATOR.len()..];
    }

    (records, rest.to_string())
}

/// Parse one complete record
///
/// `Ok(None)` means the record is noise.
///
/// # Errors
///
/// Returns `FrameError::Malformed` if a `data:` record is not a recognized frame.
pub fn parse_record(record: &str) -> Result<Option<Frame>, FrameError> {
    let Some(body) = record.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| FrameError::malformed(record, e.to_string()))?;

    serde_json::from_value(value)
        .map(Some)
        .map_err(|_| FrameError::malformed(record, "unrecognized frame shape"))
}

/// Frames produced by one [`FrameParser::feed`] call
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameBatch {
    /// Newly complete frames, in arrival order
    pub frames: Vec<Frame>,
    /// Set when the parser halted during this call
    pub error: Option<FrameError>,
}

/// Running frame parser
///
/// Feed it decoded text as it arrives; it returns whatever frames became
/// complete and keeps the rest.
#[derive(Debug, Default)]
pub struct FrameParser {
    carry: String,
    halted: bool,
    frames_emitted: u64,
}

impl FrameParser {
    /// Create a parser with nothing carried over
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next text fragment
    pub fn feed(&mut self, fragment: &str) -> FrameBatch {
        if self.halted {
            return FrameBatch {
                frames: Vec::new(),
                error: Some(FrameError::Halted),
            };
        }

        let (records, carry) = split_records(&self.carry, fragment);
        self.carry = carry;

        let mut frames = Vec::with_capacity(records.len());
        for record in records {
            match parse_record(&record) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {
                    if !record.trim().is_empty() {
                        tracing::trace!(len = record.len(), "Dropping non-data record");
                    }
                }
                Err(error) => {
                    self.halted = true;
                    self.carry.clear();
                    self.frames_emitted += frames.len() as u64;
                    return FrameBatch {
                        frames,
                        error: Some(error),
                    };
                }
            }
        }

        self.frames_emitted += frames.len() as u64;
        FrameBatch {
            frames,
            error: None,
        }
    }

    /// End of input: returns the leftover text, if any was not blank
    pub fn finish(&mut self) -> Option<String> {
        let leftover = std::mem::take(&mut self.carry);
        if leftover.trim().is_empty() {
            None
        } else {
            Some(leftover)
        }
    }

    /// Text waiting for its record boundary
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.carry
    }

    /// Check if the parser stopped after a malformed frame
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Total frames returned so far
    #[must_use]
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FINAL: &str = r#"data: {"final":{"session_id":7,"turn_id":42,"created_at":"2024-01-01T00:00:00Z","prompt":"X"}}"#;

    fn stream_text() -> String {
        format!(
            "data: {{\"provider\":\"gemini\",\"chunk\":\"Hel\"}}\n\n\
             data: {{\"provider\":\"gemini\",\"chunk\":\"lo\"}}\n\n\
             data: {{\"provider\":\"deepseek\",\"chunk\":\"Hi\"}}\n\n\
             {FINAL}\n\n"
        )
    }

    fn expected_frames() -> Vec<Frame> {
        vec![
            Frame::content("gemini", "Hel"),
            Frame::content("gemini", "lo"),
            Frame::content("deepseek", "Hi"),
            Frame::Completion {
                completion: Completion {
                    session_id: SessionId(7),
                    turn_id: TurnId(42),
                    created_at: "2024-01-01T00:00:00Z".to_string(),
                    prompt: "X".to_string(),
                },
            },
        ]
    }

    #[test]
    fn test_split_records_keeps_tail() {
        let (records, carry) = split_records("data: a", "bc\n\ndata: d");
        assert_eq!(records, vec!["data: abc".to_string()]);
        assert_eq!(carry, "data: d");
    }

    #[test]
    fn test_parse_record_noise_is_dropped() {
        assert_eq!(parse_record(": keep-alive"), Ok(None));
        assert_eq!(parse_record(""), Ok(None));
        assert_eq!(parse_record("event: chunk"), Ok(None));
    }

    #[test]
    fn test_whole_stream_in_one_delivery() {
        let mut parser = FrameParser::new();
        let batch = parser.feed(&stream_text());
        assert_eq!(batch.error, None);
        assert_eq!(batch.frames, expected_frames());
        assert_eq!(parser.pending(), "");
        assert_eq!(parser.frames_emitted(), 4);
    }

    #[test]
    fn test_every_split_point_gives_same_frames() {
        let text = stream_text();
        for split in 0..=text.len() {
            if !text.is_char_boundary(split) {
                continue;
            }
            let mut parser = FrameParser::new();
            let mut frames = parser.feed(&text[..split]).frames;
            frames.extend(parser.feed(&text[split..]).frames);
            assert_eq!(frames, expected_frames(), "split at {split}");
        }
    }

    #[test]
    fn test_character_at_a_time() {
        let text = stream_text();
        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for ch in text.chars() {
            frames.extend(parser.feed(&ch.to_string()).frames);
        }
        assert_eq!(frames, expected_frames());
    }

    #[test]
    fn test_noise_between_frames() {
        let mut parser = FrameParser::new();
        let batch = parser.feed(
            ": ping\n\nretry: 100\n\ndata: {\"provider\":\"a\",\"chunk\":\"1\"}\n\n\n\n",
        );
        assert_eq!(batch.frames, vec![Frame::content("a", "1")]);
        assert_eq!(batch.error, None);
    }

    #[test]
    fn test_malformed_json_halts_after_earlier_frames() {
        let mut parser = FrameParser::new();
        let batch = parser.feed(
            "data: {\"provider\":\"a\",\"chunk\":\"1\"}\n\n\
             data: {not json\n\n\
             data: {\"provider\":\"a\",\"chunk\":\"2\"}\n\n",
        );
        assert_eq!(batch.frames, vec![Frame::content("a", "1")]);
        assert!(matches!(batch.error, Some(FrameError::Malformed { .. })));
        assert!(parser.is_halted());

        let after = parser.feed("data: {\"provider\":\"a\",\"chunk\":\"3\"}\n\n");
        assert!(after.frames.is_empty());
        assert_eq!(after.error, Some(FrameError::Halted));
    }

    #[test]
    fn test_unknown_shape_is_malformed() {
        match parse_record(r#"data: {"status":"ok"}"#) {
            Err(FrameError::Malformed { reason, .. }) => {
                assert_eq!(reason, "unrecognized frame shape");
            }
            other => panic!("expected malformed frame, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_reports_leftover() {
        let mut parser = FrameParser::new();
        parser.feed("data: {\"provider\":\"a\"");
        assert_eq!(parser.finish().as_deref(), Some("data: {\"provider\":\"a\""));
        assert_eq!(parser.finish(), None);

        let mut parser = FrameParser::new();
        parser.feed("data: {\"provider\":\"a\",\"chunk\":\"1\"}\n\n\n");
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_completion_without_prompt_field() {
        let frame = parse_record(
            r#"data: {"final":{"session_id":1,"turn_id":2,"created_at":"2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap()
        .unwrap();
        assert!(frame.is_completion());
    }
}
