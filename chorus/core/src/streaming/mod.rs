//! Streaming Infrastructure for Multiplexed Provider Answers
//!
//! One summarize exchange carries the answers of several providers
//! interleaved in a single body. This module turns that body into frames and
//! folds the frames into one turn.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   bytes   ┌──────────────────────────────┐  frames  ┌────────────────┐
//! │  ByteStream   │ ────────▶ │ FrameStream                  │ ───────▶ │ TurnAggregator │
//! │ (HTTP body)   │           │  Utf8Decoder → FrameParser   │          │  per-provider  │
//! └───────────────┘           └──────────────────────────────┘          │  accumulators  │
//!                                        ▲                               └───────┬────────┘
//!                                        │ CancellationToken                     │ Completed
//!                                        └───────────────────────────────────────▼
//!                                                                         Reconciler
//! ```
//!
//! # Features
//!
//! - **Split-safe**: deliveries may split records, JSON documents and UTF-8 sequences
//! - **Ordered**: frames are applied exactly in the order the backend wrote them
//! - **No cross-contamination**: each provider lands in its own accumulator
//! - **Cancellable**: one token checked before every state mutation
//!
//! # Example
//!
//! ```ignore
//! use chorus_core::streaming::{CancelPolicy, FrameStream, TurnAggregator};
//!
//! let mut frames = FrameStream::new(body, cancel.clone(), CancelPolicy::AbortRead);
//! let mut aggregator = TurnAggregator::begin(temp_id, "X", created_at, cancel);
//! while let Some(frame) = frames.next_frame().await {
//!     aggregator.apply(frame?);
//! }
//! ```

mod aggregator;
mod frame_stream;

pub use aggregator::{Applied, PhaseError, TurnAggregator, TurnFailure, TurnPhase};
pub use frame_stream::{CancelPolicy, FrameStream, StreamError};
