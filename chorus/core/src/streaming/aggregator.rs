//! Turn Aggregator
//!
//! Owns the accumulation state of the one in-flight turn and applies frames
//! to it in arrival order.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──send──▶ Pending(tmp) ──content──▶ Streaming(tmp) ──final──▶ Finalized(id)
//!                      │                        │   ▲
//!                      │                        └───┘ content
//!                      └──────────┬─────────────┘
//!                                 ▼
//!                       Failed(transport | parse | cancelled)
//! ```
//!
//! Transitions are pure functions on [`TurnPhase`]; the aggregator only
//! stores the result. A failure keeps whatever content already arrived.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::messages::{TempTurnId, TurnId};
use crate::session::{ChatTurn, ProviderResponse};
use crate::transport::{Completion, Frame};

/// Why a turn ended without finalization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnFailure {
    /// The exchange failed (status, missing body, read error, truncation)
    Transport(String),
    /// A frame was malformed
    Parse(String),
    /// The consumer cancelled the turn
    Cancelled,
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) | Self::Parse(message) => write!(f, "{message}"),
            Self::Cancelled => write!(f, "Request cancelled."),
        }
    }
}

/// Illegal phase transitions
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// The turn already ended
    #[error("turn is closed")]
    Closed,
    /// No turn has started
    #[error("no turn in flight")]
    NotStarted,
}

/// Lifecycle phase of one turn
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TurnPhase {
    /// Nothing in flight
    #[default]
    Idle,
    /// Placeholder created, no content yet
    Pending(TempTurnId),
    /// At least one content frame applied
    Streaming(TempTurnId),
    /// Completion frame applied
    Finalized(TurnId),
    /// Ended by a failure
    Failed(TurnFailure),
}

impl TurnPhase {
    /// Transition for a content frame
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` unless the turn is pending or streaming.
    pub fn on_content(&self) -> Result<Self, PhaseError> {
        match self {
            Self::Pending(temp) | Self::Streaming(temp) => Ok(Self::Streaming(*temp)),
            Self::Idle => Err(PhaseError::NotStarted),
            Self::Finalized(_) | Self::Failed(_) => Err(PhaseError::Closed),
        }
    }

    /// Transition for the completion frame
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` unless the turn is pending or streaming.
    pub fn on_completion(&self, id: TurnId) -> Result<Self, PhaseError> {
        match self {
            Self::Pending(_) | Self::Streaming(_) => Ok(Self::Finalized(id)),
            Self::Idle => Err(PhaseError::NotStarted),
            Self::Finalized(_) | Self::Failed(_) => Err(PhaseError::Closed),
        }
    }

    /// Transition for a failure
    ///
    /// A finalized turn stays finalized; failures after the completion frame
    /// do not reopen it.
    #[must_use]
    pub fn on_failure(&self, failure: TurnFailure) -> Self {
        match self {
            Self::Finalized(_) | Self::Failed(_) => self.clone(),
            Self::Idle | Self::Pending(_) | Self::Streaming(_) => Self::Failed(failure),
        }
    }

    /// Check if frames are still accepted
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending(_) | Self::Streaming(_))
    }
}

/// Result of applying one frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Chunk appended to a provider's accumulator
    Content {
        /// Provider key
        provider: String,
        /// Position of the provider in the response list
        index: usize,
        /// The chunk as received
        chunk: String,
        /// Whether this chunk created the provider's entry
        first_chunk: bool,
    },
    /// The turn was closed by the completion frame
    Completed(Completion),
    /// The turn is closed; the frame had no effect
    Rejected(Frame),
    /// The cancellation token fired; the frame had no effect
    Cancelled,
}

/// Accumulation state for one in-flight turn
#[derive(Debug)]
pub struct TurnAggregator {
    turn: ChatTurn,
    phase: TurnPhase,
    /// Provider key -> index into `turn.responses`
    positions: HashMap<String, usize>,
    cancel: CancellationToken,
    frames_applied: usize,
}

impl TurnAggregator {
    /// Create the placeholder turn for a new send (`Idle -> Pending`)
    pub fn begin(
        temp_id: TempTurnId,
        prompt: impl Into<String>,
        created_at: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            turn: ChatTurn::pending(temp_id, prompt, created_at),
            phase: TurnPhase::Pending(temp_id),
            positions: HashMap::new(),
            cancel,
            frames_applied: 0,
        }
    }

    /// Apply the next frame
    pub fn apply(&mut self, frame: Frame) -> Applied {
        if self.cancel.is_cancelled() {
            self.phase = self.phase.on_failure(TurnFailure::Cancelled);
            return Applied::Cancelled;
        }

        let next = match &frame {
            Frame::Content { .. } => self.phase.on_content(),
            Frame::Completion { completion } => self.phase.on_completion(completion.turn_id),
        };
        let Ok(next) = next else {
            return Applied::Rejected(frame);
        };
        self.phase = next;
        self.frames_applied += 1;

        match frame {
            Frame::Content { provider, chunk } => {
                let (index, first_chunk) = self.accumulate(&provider, &chunk);
                Applied::Content {
                    provider,
                    index,
                    chunk,
                    first_chunk,
                }
            }
            Frame::Completion { completion } => Applied::Completed(completion),
        }
    }

    /// Append a chunk to its provider's entry, creating it on first sight
    fn accumulate(&mut self, provider: &str, chunk: &str) -> (usize, bool) {
        if let Some(&index) = self.positions.get(provider) {
            self.turn.responses[index].content.push_str(chunk);
            return (index, false);
        }

        let index = self.turn.responses.len();
        self.turn
            .responses
            .push(ProviderResponse::new(provider, chunk));
        self.positions.insert(provider.to_string(), index);
        (index, true)
    }

    /// Record a failure; partial content stays
    pub fn fail(&mut self, failure: TurnFailure) {
        self.phase = self.phase.on_failure(failure);
    }

    /// The turn as accumulated so far
    #[must_use]
    pub fn turn(&self) -> &ChatTurn {
        &self.turn
    }

    /// Mutable access for reconciliation
    pub(crate) fn turn_mut(&mut self) -> &mut ChatTurn {
        &mut self.turn
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// Number of frames that changed state
    #[must_use]
    pub fn frames_applied(&self) -> usize {
        self.frames_applied
    }

    /// Check if the turn's token fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Give up ownership of the turn
    #[must_use]
    pub fn into_turn(self) -> ChatTurn {
        self.turn
    }
}
