//! Chorus Core - Streaming Multiplex-and-Reconciliation Engine
//!
//! This crate is the engine behind the chorus multi-model chat client. One
//! prompt goes to several language-model providers at once; the backend
//! answers with a single stream in which every provider's chunks are
//! interleaved, followed by one completion record. The engine splits that
//! stream back into per-provider answers, shows them as they grow, and then
//! commits the turn under the identity the backend issued.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        UI Consumer                               │
//! │          (TUI, web bridge, the `chorus` CLI, a test)             │
//! └───────────────────────────────▲──────────────────────────────────┘
//!                                 │ ConductorMessage (bounded mpsc)
//! ┌───────────────────────────────┴──────────────────────────────────┐
//! │                         CHORUS CORE                              │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                        Conductor                           │  │
//! │  │  ┌────────────┐  ┌────────────────┐  ┌──────────────────┐  │  │
//! │  │  │ FrameStream│─▶│ TurnAggregator │─▶│    Reconciler    │  │  │
//! │  │  │ utf8+frame │  │ per-provider   │  │ id swap, session │  │  │
//! │  │  └─────▲──────┘  └────────────────┘  └──────────────────┘  │  │
//! │  └────────┼───────────────────────────────────────────────────┘  │
//! │           │ ByteStream                                           │
//! │  ┌────────┴───────────────────────────────────────────────────┐  │
//! │  │ ChatBackend (HttpBackend: /api/summarize, /api/sessions)   │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: drives sends, history loads and the notice
//! - [`ConductorMessage`]: messages sent from the Conductor to the consumer
//! - [`ChatTurn`]: one prompt and its provider answers
//! - [`Frame`]: one record of the streaming protocol
//! - [`TurnPhase`]: lifecycle of a turn as an explicit state machine
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chorus_core::{load_config, Conductor, HttpBackend, StaticCredentials};
//! use tokio::sync::mpsc;
//!
//! let config = load_config()?;
//! let credentials = Arc::new(StaticCredentials::from_option(config.backend.api_token.clone()));
//! let backend = HttpBackend::from_settings(&config.backend, credentials)?;
//!
//! let (tx, mut rx) = mpsc::channel(config.chat.message_capacity);
//! let mut conductor = Conductor::new(backend, config.chat.clone(), tx);
//! let outcome = conductor.send("Explain lifetimes").await;
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: UTF-8 carry decoding, record splitting, frame parsing
//! - [`backend`]: backend trait and the HTTP implementation
//! - [`streaming`]: frame stream over a body and the turn aggregator
//! - [`reconcile`]: identity commit, session adoption, provider selection
//! - [`conductor`]: the Conductor
//! - [`session`]: sessions, turns and provider responses
//! - [`messages`]: identifiers and Conductor messages
//! - [`config`]: TOML and environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod messages;
pub mod reconcile;
pub mod session;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use backend::{
    ByteStream, ChatBackend, CredentialProvider, HttpBackend, StaticCredentials, SummarizeRequest,
};
pub use conductor::{Conductor, SendFlag, SendGuard, SendOutcome, SkipReason};
pub use messages::{ConductorMessage, SessionId, TempTurnId, TurnId};
pub use reconcile::{default_provider, Reconciler, ReconcileError, SUMMARIZER_PROVIDER};
pub use session::{ChatTurn, ProviderResponse, Session, TurnIdentity};

// Streaming exports
pub use streaming::{
    Applied, CancelPolicy, FrameStream, PhaseError, StreamError, TurnAggregator, TurnFailure,
    TurnPhase,
};

// Transport exports
pub use transport::{Completion, Frame, FrameError, FrameParser, TransportError, Utf8Decoder};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BackendSettings, ChatConfig,
    ChorusConfig, ConfigError, ConfigOverrides, ConfigSource,
};
