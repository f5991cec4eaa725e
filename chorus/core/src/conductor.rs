//! Conductor - The Orchestration Core
//!
//! The Conductor drives one conversation context. It owns:
//! - the transcript (live and replayed turns)
//! - the active session and per-turn provider selection
//! - the single-flight send flag
//! - the user-visible error notice
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It talks to whatever surface is attached
//! through [`ConductorMessage`]s on a bounded channel and never waits on it:
//! a slow consumer loses messages, never frames. Consumers that fall behind
//! can always re-read [`Conductor::turns`].
//!
//! # Send Lifecycle
//!
//! ```text
//! send("X")
//!   ├─ blank prompt ───────────────────────────▶ Skipped(EmptyPrompt)
//!   ├─ flag held ──────────────────────────────▶ Skipped(SendInProgress)
//!   └─ TurnStarted ─▶ summarize ─▶ FrameStream ─▶ TurnAggregator
//!                                        │              │ Completed
//!                                        │              ▼
//!                                        │         Reconciler ─▶ TurnFinalized + SessionsStale
//!                                        └─ error / cancel ─▶ TurnFailed (+ Notice)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{ByteStream, ChatBackend, SummarizeRequest};
use crate::config::ChatConfig;
use crate::messages::{ConductorMessage, SessionId, TempTurnId, TurnId};
use crate::reconcile::{default_provider, Reconciler};
use crate::session::{ChatTurn, Session, TurnIdentity};
use crate::streaming::{
    Applied, CancelPolicy, FrameStream, StreamError, TurnAggregator, TurnFailure, TurnPhase,
};
use crate::transport::{TransportError, GENERIC_FAILURE_MESSAGE};

// ============================================================================
// Single-flight guard
// ============================================================================

/// Shared "a send is in flight" flag
///
/// Clones share the same flag, so a surface can disable its input while the
/// Conductor streams.
#[derive(Clone, Debug, Default)]
pub struct SendFlag(Arc<AtomicBool>);

impl SendFlag {
    /// Create a released flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag, or `None` if it is already held
    #[must_use]
    pub fn try_acquire(&self) -> Option<SendGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SendGuard(Arc::clone(&self.0)))
    }

    /// Check if a send holds the flag
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the send flag when dropped
#[derive(Debug)]
pub struct SendGuard(Arc<AtomicBool>);

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a send did nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Prompt was empty after trimming
    EmptyPrompt,
    /// Another send holds the flag
    SendInProgress,
}

/// Result of one send
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// No turn was created
    Skipped(SkipReason),
    /// The turn was committed under this id
    Finalized(TurnId),
    /// The turn ended without finalization; partial content is in the transcript
    Failed(TurnFailure),
}

// ============================================================================
// Conductor
// ============================================================================

/// The Conductor - headless orchestration core
pub struct Conductor<B: ChatBackend> {
    /// Backend for summarize and history
    backend: Arc<B>,
    /// Request parameters and cancel policy
    config: ChatConfig,
    /// Channel to the UI state consumer
    tx: mpsc::Sender<ConductorMessage>,
    /// Transcript, oldest first
    turns: Vec<ChatTurn>,
    /// Last fetched session list
    sessions: Vec<Session>,
    /// Active session and provider selection
    reconciler: Reconciler,
    /// Dismissible error notice
    notice: Option<String>,
    /// Single-flight flag
    send_flag: SendFlag,
    /// Parent of every per-send token
    shutdown: CancellationToken,
    /// Phase of the most recent turn
    phase: TurnPhase,
    /// Last placeholder id handed out
    last_temp_id: i64,
}

impl<B: ChatBackend> Conductor<B> {
    /// Create a Conductor with an empty transcript and no active session
    pub fn new(backend: B, config: ChatConfig, tx: mpsc::Sender<ConductorMessage>) -> Self {
        Self::with_backend(Arc::new(backend), config, tx)
    }

    /// Create a Conductor sharing an existing backend
    pub fn with_backend(
        backend: Arc<B>,
        config: ChatConfig,
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Self {
        info!(
            backend = backend.name(),
            models = ?config.models,
            cancel_policy = %config.cancel_policy,
            "Conductor created"
        );
        Self {
            backend,
            config,
            tx,
            turns: Vec::new(),
            sessions: Vec::new(),
            reconciler: Reconciler::new(),
            notice: None,
            send_flag: SendFlag::new(),
            shutdown: CancellationToken::new(),
            phase: TurnPhase::Idle,
            last_temp_id: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Send a prompt and stream the answers into a new turn
    ///
    /// Cancelled by [`Conductor::shutdown_token`].
    pub async fn send(&mut self, prompt: &str) -> SendOutcome {
        let cancel = self.shutdown.child_token();
        self.send_with_cancel(prompt, cancel).await
    }

    /// Send a prompt with a caller-owned cancellation token
    pub async fn send_with_cancel(
        &mut self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> SendOutcome {
        if prompt.trim().is_empty() {
            debug!("Ignoring empty prompt");
            return SendOutcome::Skipped(SkipReason::EmptyPrompt);
        }
        let Some(_guard) = self.send_flag.try_acquire() else {
            debug!("Send already in progress, rejecting");
            return SendOutcome::Skipped(SkipReason::SendInProgress);
        };

        self.dismiss_notice();

        let temp_id = self.next_temp_id();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut aggregator = TurnAggregator::begin(temp_id, prompt, created_at, cancel.clone());
        self.emit(ConductorMessage::TurnStarted {
            turn: aggregator.turn().clone(),
        });

        let request = SummarizeRequest::new(prompt, self.config.models.clone())
            .with_session(self.reconciler.active_session())
            .with_summary_model(self.config.summary_model.clone())
            .with_anonymous(self.config.llm_anonymous);

        info!(
            turn = %temp_id,
            session = ?self.reconciler.active_session(),
            models = ?request.models,
            "Turn started"
        );

        let opened = self.open(&request, &cancel).await;
        match opened {
            Ok(body) => self.drive(body, &mut aggregator, cancel).await,
            Err(failure) => aggregator.fail(failure),
        }

        self.finish(aggregator)
    }

    /// Open the summarize stream, abandoning it early under `AbortRead`
    async fn open(
        &self,
        request: &SummarizeRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, TurnFailure> {
        let opened = match self.config.cancel_policy {
            CancelPolicy::AbortRead => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(TurnFailure::Cancelled),
                    opened = self.backend.summarize(request) => opened,
                }
            }
            CancelPolicy::DrainSilently => self.backend.summarize(request).await,
        };

        opened.map_err(|e| {
            warn!(error = %e, "Summarize request failed");
            TurnFailure::Transport(e.user_message())
        })
    }

    /// Apply frames until the body ends, fails or is cancelled
    async fn drive(
        &mut self,
        body: ByteStream,
        aggregator: &mut TurnAggregator,
        cancel: CancellationToken,
    ) {
        let mut frames = FrameStream::new(body, cancel.clone(), self.config.cancel_policy);

        while let Some(item) = frames.next_frame().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(StreamError::Cancelled) => {
                    aggregator.fail(TurnFailure::Cancelled);
                    break;
                }
                Err(StreamError::Transport(e)) => {
                    warn!(error = %e, bytes_read = frames.bytes_read(), "Stream failed");
                    aggregator.fail(TurnFailure::Transport(e.user_message()));
                    break;
                }
                Err(StreamError::Parse(e)) => {
                    warn!(error = %e, "Malformed frame, ending stream");
                    aggregator.fail(TurnFailure::Parse(e.to_string()));
                    break;
                }
            };

            match aggregator.apply(frame) {
                Applied::Content {
                    provider,
                    index,
                    chunk,
                    ..
                } => {
                    self.emit(ConductorMessage::ResponseUpdated {
                        turn: aggregator.turn().turn_id,
                        provider,
                        index,
                        chunk,
                    });
                }
                Applied::Completed(completion) => {
                    match self.reconciler.reconcile(aggregator.turn_mut(), &completion) {
                        Ok(reconciliation) => {
                            info!(
                                turn_id = %reconciliation.turn_id,
                                session_id = %reconciliation.session_id,
                                providers = aggregator.turn().responses.len(),
                                "Turn finalized"
                            );
                            self.emit(ConductorMessage::TurnFinalized {
                                previous: reconciliation.previous,
                                turn_id: reconciliation.turn_id,
                                created_at: reconciliation.created_at,
                                session_id: reconciliation.session_id,
                                default_provider: reconciliation.default_provider,
                            });
                            self.emit(ConductorMessage::SessionsStale);
                        }
                        Err(e) => warn!(error = %e, "Completion frame not applied"),
                    }
                }
                Applied::Rejected(frame) => {
                    warn!(
                        completion = frame.is_completion(),
                        phase = ?aggregator.phase(),
                        "Ignoring frame after turn closed"
                    );
                }
                Applied::Cancelled => {
                    debug!("Frame dropped after cancellation");
                }
            }
        }

        if aggregator.phase().is_open() {
            let failure = if cancel.is_cancelled() {
                TurnFailure::Cancelled
            } else {
                warn!(
                    bytes_read = frames.bytes_read(),
                    "Stream ended without a completion frame"
                );
                TurnFailure::Transport(TransportError::Truncated.user_message())
            };
            aggregator.fail(failure);
        }
    }

    /// Settle the turn into the transcript and report the outcome
    fn finish(&mut self, aggregator: TurnAggregator) -> SendOutcome {
        let phase = aggregator.phase().clone();
        let turn = aggregator.into_turn();
        let identity = turn.turn_id;
        self.turns.push(turn);

        let outcome = match &phase {
            TurnPhase::Finalized(id) => SendOutcome::Finalized(*id),
            TurnPhase::Failed(failure) => {
                self.emit(ConductorMessage::TurnFailed {
                    turn: identity,
                    failure: failure.clone(),
                });
                if let Some(message) = notice_message(failure) {
                    self.set_notice(message);
                }
                SendOutcome::Failed(failure.clone())
            }
            // drive() always closes the turn
            TurnPhase::Idle | TurnPhase::Pending(_) | TurnPhase::Streaming(_) => {
                SendOutcome::Failed(TurnFailure::Transport(GENERIC_FAILURE_MESSAGE.to_string()))
            }
        };

        debug!(turn = %identity, outcome = ?outcome, "Send finished");
        self.phase = phase;
        outcome
    }

    /// Placeholder ids are wall-clock milliseconds, strictly increasing
    fn next_temp_id(&mut self) -> TempTurnId {
        let now = Utc::now().timestamp_millis();
        self.last_temp_id = now.max(self.last_temp_id + 1);
        TempTurnId(self.last_temp_id)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Replace the transcript with a stored session
    ///
    /// On failure the transcript is cleared and the notice is set.
    ///
    /// # Errors
    ///
    /// Returns the `TransportError` of the history call.
    pub async fn load_session(&mut self, id: SessionId) -> Result<usize, TransportError> {
        self.reconciler.set_active_session(Some(id));

        match self.backend.load_session(id).await {
            Ok(turns) => {
                info!(session_id = %id, turns = turns.len(), "Session loaded");
                self.reconciler.initialize(&turns);
                self.turns = turns;
                self.emit(ConductorMessage::TranscriptReplaced {
                    session_id: Some(id),
                    turn_count: self.turns.len(),
                });
                Ok(self.turns.len())
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to load session");
                self.turns.clear();
                self.reconciler.initialize(&[]);
                self.emit(ConductorMessage::TranscriptReplaced {
                    session_id: Some(id),
                    turn_count: 0,
                });
                self.set_notice(e.user_message());
                Err(e)
            }
        }
    }

    /// Re-fetch the session list
    ///
    /// A failure keeps the previous list.
    ///
    /// # Errors
    ///
    /// Returns the `TransportError` of the list call.
    pub async fn refresh_sessions(&mut self) -> Result<usize, TransportError> {
        match self.backend.list_sessions().await {
            Ok(sessions) => {
                debug!(count = sessions.len(), "Sessions refreshed");
                self.sessions = sessions;
                self.emit(ConductorMessage::SessionsLoaded {
                    count: self.sessions.len(),
                });
                Ok(self.sessions.len())
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh sessions");
                Err(e)
            }
        }
    }

    /// Start a new chat: no active session, empty transcript
    pub fn new_chat(&mut self) {
        debug!("Starting new chat");
        self.reconciler.reset();
        self.turns.clear();
        self.phase = TurnPhase::Idle;
        self.emit(ConductorMessage::TranscriptReplaced {
            session_id: None,
            turn_count: 0,
        });
    }

    // ------------------------------------------------------------------------
    // Selection and notices
    // ------------------------------------------------------------------------

    /// Show a different provider for a turn
    ///
    /// Failed turns keep their placeholder identity and stay selectable by it.
    /// Returns `false` if the turn is unknown or has no such provider.
    pub fn select_provider(&mut self, turn: impl Into<TurnIdentity>, provider: &str) -> bool {
        let turn = turn.into();
        let known = self
            .find_turn(turn)
            .is_some_and(|t| t.response(provider).is_some());
        if known {
            self.reconciler.select(turn, provider);
        }
        known
    }

    /// Provider shown for a turn
    ///
    /// Falls back to the default provider when nothing was recorded.
    #[must_use]
    pub fn selected_provider(&self, turn: impl Into<TurnIdentity>) -> Option<&str> {
        let turn = turn.into();
        self.reconciler
            .selected_provider(turn)
            .or_else(|| self.find_turn(turn).and_then(|t| default_provider(&t.responses)))
    }

    fn find_turn(&self, turn: TurnIdentity) -> Option<&ChatTurn> {
        self.turns.iter().find(|t| t.turn_id == turn)
    }

    /// Current error notice
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Clear the error notice
    pub fn dismiss_notice(&mut self) {
        if self.notice.take().is_some() {
            self.emit(ConductorMessage::NoticeCleared);
        }
    }

    fn set_notice(&mut self, message: String) {
        self.notice = Some(message.clone());
        self.emit(ConductorMessage::Notice { message });
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Transcript, oldest first
    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Last fetched session list
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Session new sends are filed under
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        self.reconciler.active_session()
    }

    /// Phase of the most recent turn
    #[must_use]
    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// Check if a send is in flight
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.send_flag.is_held()
    }

    /// Handle on the single-flight flag
    #[must_use]
    pub fn send_flag(&self) -> SendFlag {
        self.send_flag.clone()
    }

    /// Token that cancels the current and every future [`Conductor::send`]
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request parameters in use
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Send a message to the consumer without waiting
    fn emit(&self, msg: ConductorMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                warn!(message = ?msg, "Consumer channel full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Consumer channel closed");
            }
        }
    }
}

/// Notice text for a failed turn; cancellation is silent
fn notice_message(failure: &TurnFailure) -> Option<String> {
    match failure {
        TurnFailure::Transport(message) => Some(message.clone()),
        TurnFailure::Parse(_) => Some(GENERIC_FAILURE_MESSAGE.to_string()),
        TurnFailure::Cancelled => None,
    }
}
