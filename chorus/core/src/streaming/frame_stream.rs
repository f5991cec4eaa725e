//! Byte stream to frame sequence
//!
//! [`FrameStream`] owns the body of one summarize exchange and turns it into
//! a lazy, finite, non-restartable sequence of frames. The only suspension
//! point is the read of the next body chunk; decoding and parsing run
//! synchronously in between.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::backend::ByteStream;
use crate::transport::{Frame, FrameError, FrameParser, TransportError, Utf8Decoder};

/// What happens to the network read when the consumer is torn down
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Stop reading as soon as the token fires (default)
    #[default]
    AbortRead,
    /// Keep reading to the end, but apply nothing after the token fires
    DrainSilently,
}

impl std::str::FromStr for CancelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort_read" | "abort-read" | "abort" => Ok(Self::AbortRead),
            "drain_silently" | "drain-silently" | "drain" => Ok(Self::DrainSilently),
            other => Err(format!("unknown cancel policy: {other}")),
        }
    }
}

impl std::fmt::Display for CancelPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AbortRead => write!(f, "abort_read"),
            Self::DrainSilently => write!(f, "drain_silently"),
        }
    }
}

/// Errors that end a frame stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Reading the body failed
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A frame was malformed
    #[error(transparent)]
    Parse(#[from] FrameError),
    /// The cancellation token fired under `CancelPolicy::AbortRead`
    #[error("stream cancelled")]
    Cancelled,
}

/// Lazy sequence of frames over one response body
pub struct FrameStream {
    source: ByteStream,
    decoder: Utf8Decoder,
    parser: FrameParser,
    /// Frames parsed but not yet handed out
    ready: VecDeque<Frame>,
    /// Error to report once `ready` is drained
    failure: Option<StreamError>,
    cancel: CancellationToken,
    policy: CancelPolicy,
    finished: bool,
    bytes_read: usize,
}

impl FrameStream {
    /// Wrap a response body
    #[must_use]
    pub fn new(source: ByteStream, cancel: CancellationToken, policy: CancelPolicy) -> Self {
        Self {
            source,
            decoder: Utf8Decoder::new(),
            parser: FrameParser::new(),
            ready: VecDeque::new(),
            failure: None,
            cancel,
            policy,
            finished: false,
            bytes_read: 0,
        }
    }

    /// Next frame, an error that ends the stream, or `None` when exhausted
    pub async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(Ok(frame));
            }
            if let Some(error) = self.failure.take() {
                self.finished = true;
                return Some(Err(error));
            }
            if self.finished {
                return None;
            }

            let chunk = match self.policy {
                CancelPolicy::AbortRead => {
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => {
                            debug!(bytes_read = self.bytes_read, "Cancelled, abandoning stream read");
                            self.finished = true;
                            return Some(Err(StreamError::Cancelled));
                        }
                        chunk = self.source.next() => chunk,
                    }
                }
                CancelPolicy::DrainSilently => self.source.next().await,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    self.bytes_read += bytes.len();
                    let text = self.decoder.decode(&bytes);
                    self.absorb(&text);
                }
                Some(Err(error)) => {
                    debug!(error = %error, bytes_read = self.bytes_read, "Stream read failed");
                    self.failure = Some(StreamError::Transport(error));
                    self.finished = true;
                }
                None => {
                    let tail = self.decoder.finish();
                    if !tail.is_empty() {
                        self.absorb(&tail);
                    }
                    if let Some(leftover) = self.parser.finish() {
                        debug!(len = leftover.len(), "Discarding incomplete record at end of stream");
                    }
                    trace!(bytes_read = self.bytes_read, "Stream exhausted");
                    self.finished = true;
                }
            }
        }
    }

    /// Parse decoded text into the ready queue
    fn absorb(&mut self, text: &str) {
        let batch = self.parser.feed(text);
        if !batch.frames.is_empty() {
            trace!(frames = batch.frames.len(), "Parsed frames");
        }
        self.ready.extend(batch.frames);
        if let Some(error) = batch.error {
            self.failure = Some(StreamError::Parse(error));
            self.finished = true;
        }
    }

    /// Total body bytes read so far
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Check if the sequence has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished && self.ready.is_empty() && self.failure.is_none()
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<Frame, StreamError>> {
        futures::stream::unfold(self, |mut frames| async move {
            frames.next_frame().await.map(|item| (item, frames))
        })
    }
}
