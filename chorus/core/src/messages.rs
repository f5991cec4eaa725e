//! Conductor Messages
//!
//! Identifiers shared across the engine and the messages the Conductor sends
//! to whatever UI state consumer is attached (a TUI, a web bridge, the CLI).
//!
//! # Design Philosophy
//!
//! The Conductor owns the transcript. Consumers never mutate it; they render
//! what these messages tell them and ask the Conductor for snapshots when they
//! need the whole picture.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::{ChatTurn, TurnIdentity};
use crate::streaming::TurnFailure;

/// Backend-issued session identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-issued (final) turn identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub i64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated placeholder turn identifier
///
/// Wall-clock milliseconds at send time, bumped when needed so it is strictly
/// increasing within one Conductor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempTurnId(pub i64);

impl fmt::Display for TempTurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// Messages from the Conductor to the UI state consumer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConductorMessage {
    // ============================================
    // Turn Lifecycle
    // ============================================
    /// A placeholder turn was created for a new send
    TurnStarted {
        /// Snapshot of the placeholder (pending identity, no responses yet)
        turn: ChatTurn,
    },

    /// A content chunk landed in a provider's accumulator
    ResponseUpdated {
        /// Identity of the turn being streamed
        turn: TurnIdentity,
        /// Provider the chunk belongs to
        provider: String,
        /// Position of the provider in the turn's response list
        index: usize,
        /// The chunk text as received
        chunk: String,
    },

    /// The placeholder identity was swapped for the server-issued one
    TurnFinalized {
        /// Identity the turn had before reconciliation
        previous: TurnIdentity,
        /// Final turn id
        turn_id: TurnId,
        /// Server timestamp of the turn
        created_at: String,
        /// Session the backend filed the turn under
        session_id: SessionId,
        /// Provider shown by default for this turn
        default_provider: Option<String>,
    },

    /// The turn ended without finalization; partial content is kept
    TurnFailed {
        /// Identity of the failed turn
        turn: TurnIdentity,
        /// Why it failed
        failure: TurnFailure,
    },

    // ============================================
    // Sessions
    // ============================================
    /// The session list changed on the backend and should be re-fetched
    SessionsStale,

    /// The session list was refreshed
    SessionsLoaded {
        /// Number of sessions now known
        count: usize,
    },

    /// The transcript was replaced wholesale (history load or new chat)
    TranscriptReplaced {
        /// Active session after the replacement
        session_id: Option<SessionId>,
        /// Number of turns in the new transcript
        turn_count: usize,
    },

    // ============================================
    // Notices
    // ============================================
    /// A user-visible, dismissible error notice
    Notice {
        /// Human-readable message
        message: String,
    },

    /// The notice was cleared
    NoticeCleared,
}
