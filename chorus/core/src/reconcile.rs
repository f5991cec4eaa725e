//! Turn Reconciliation
//!
//! Applies the completion frame to a live turn: the placeholder identity is
//! swapped for the server-issued id, the server timestamp replaces the local
//! one, and the active session is adopted. Also tracks which provider is
//! selected for display on each turn, committed or not.
//!
//! # Default Provider
//!
//! The summarizer's combined answer is shown when the backend produced one;
//! otherwise the first provider that answered.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::messages::{SessionId, TurnId};
use crate::session::{ChatTurn, ProviderResponse, TurnIdentity};
use crate::transport::Completion;

/// Provider key under which the backend streams its combined answer
pub const SUMMARIZER_PROVIDER: &str = "summarizer";

/// Reconciliation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The turn already carries a server-issued id
    #[error("turn already committed as {0}")]
    AlreadyCommitted(TurnId),
}

/// Pick the provider shown by default for a turn
#[must_use]
pub fn default_provider(responses: &[ProviderResponse]) -> Option<&str> {
    responses
        .iter()
        .find(|r| r.provider == SUMMARIZER_PROVIDER)
        .or_else(|| responses.first())
        .map(|r| r.provider.as_str())
}

/// Commit a turn's identity and timestamp from the completion frame
///
/// # Errors
///
/// Returns `ReconcileError::AlreadyCommitted` if the turn was already
/// committed; the turn is left untouched.
pub fn commit(turn: &mut ChatTurn, completion: &Completion) -> Result<TurnId, ReconcileError> {
    turn.turn_id = turn.turn_id.commit(completion.turn_id)?;
    turn.created_at.clone_from(&completion.created_at);
    Ok(completion.turn_id)
}

/// What a successful reconciliation changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    /// Identity before the swap
    pub previous: TurnIdentity,
    /// Server-issued id
    pub turn_id: TurnId,
    /// Session the turn now belongs to
    pub session_id: SessionId,
    /// Server timestamp
    pub created_at: String,
    /// Provider selected for display
    pub default_provider: Option<String>,
}

/// Session adoption and per-turn provider selection
#[derive(Debug, Default)]
pub struct Reconciler {
    active_session: Option<SessionId>,
    selections: HashMap<TurnIdentity, String>,
}

impl Reconciler {
    /// Create with no active session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a completion frame to its live turn
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::AlreadyCommitted` if the turn was already
    /// committed. Nothing changes in that case.
    pub fn reconcile(
        &mut self,
        turn: &mut ChatTurn,
        completion: &Completion,
    ) -> Result<Reconciliation, ReconcileError> {
        let previous = turn.turn_id;
        let turn_id = commit(turn, completion)?;

        if self.active_session != Some(completion.session_id) {
            info!(
                session_id = %completion.session_id,
                previous = ?self.active_session,
                "Adopting session"
            );
        }
        self.active_session = Some(completion.session_id);

        // A pick made while streaming was keyed by the placeholder
        self.selections.remove(&previous);
        let default_provider = default_provider(&turn.responses).map(str::to_string);
        if let Some(provider) = &default_provider {
            self.selections.insert(turn.turn_id, provider.clone());
        }

        debug!(
            previous = %previous,
            turn_id = %turn_id,
            default_provider = ?default_provider,
            "Turn reconciled"
        );

        Ok(Reconciliation {
            previous,
            turn_id,
            session_id: completion.session_id,
            created_at: completion.created_at.clone(),
            default_provider,
        })
    }

    /// Session new sends are filed under
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    /// Switch the active session
    pub fn set_active_session(&mut self, session: Option<SessionId>) {
        self.active_session = session;
    }

    /// Provider explicitly recorded for a turn
    #[must_use]
    pub fn selected_provider(&self, turn: impl Into<TurnIdentity>) -> Option<&str> {
        self.selections.get(&turn.into()).map(String::as_str)
    }

    /// Select a provider for a turn
    pub fn select(&mut self, turn: impl Into<TurnIdentity>, provider: impl Into<String>) {
        self.selections.insert(turn.into(), provider.into());
    }

    /// Seed default selections for replayed turns
    pub fn initialize(&mut self, turns: &[ChatTurn]) {
        self.selections.clear();
        for turn in turns {
            if let Some(provider) = default_provider(&turn.responses) {
                self.selections.insert(turn.turn_id, provider.to_string());
            }
        }
    }

    /// Forget the session and all selections
    pub fn reset(&mut self) {
        self.active_session = None;
        self.selections.clear();
    }
}
