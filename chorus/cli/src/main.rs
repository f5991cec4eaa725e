//! Chorus CLI - Multi-Model Chat from the Terminal
//!
//! Sends a prompt to several providers at once and streams their answers to
//! stdout as they arrive. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Ask with the configured models
//! chorus ask "Explain borrowing"
//!
//! # Continue a stored session, print the finished turn as JSON
//! chorus ask --session 7 --json "And lifetimes?"
//!
//! # List sessions / replay one
//! chorus sessions
//! chorus show 7
//!
//! # Verbose logging
//! RUST_LOG=chorus_core=debug chorus ask "hi"
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): cancels the in-flight turn; partial answers are kept

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chorus_core::{
    default_config_path, load_config_from_path, CancelPolicy, ChatTurn, Conductor,
    ConductorMessage, ConfigOverrides, HttpBackend, SendOutcome, SessionId, SkipReason,
    StaticCredentials, TurnFailure,
};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Chorus - ask several language models at once
#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHORUS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, value_name = "TOKEN")]
    api_token: Option<String>,

    /// Providers to query (comma-separated)
    #[arg(short = 'm', long, value_delimiter = ',', value_name = "MODELS")]
    models: Option<Vec<String>>,

    /// Provider that writes the combined answer
    #[arg(long, value_name = "MODEL")]
    summary_model: Option<String>,

    /// What happens to the network read on Ctrl-C (abort_read, drain_silently)
    #[arg(long, value_name = "POLICY")]
    cancel_policy: Option<CancelPolicy>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHORUS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a prompt and stream every provider's answer
    Ask {
        /// The prompt
        prompt: String,

        /// Continue this session
        #[arg(short = 's', long, value_name = "ID")]
        session: Option<i64>,

        /// Print the finished turn as JSON instead of streaming text
        #[arg(long)]
        json: bool,
    },

    /// List stored sessions
    Sessions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a stored session
    Show {
        /// Session id
        id: i64,

        /// Print the turns as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Initialize logging on stderr
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chorus={level},chorus_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.backend_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(ref token) = self.api_token {
            overrides = overrides.with_api_token(token.clone());
        }
        if let Some(ref models) = self.models {
            overrides = overrides.with_models(models.clone());
        }
        if let Some(ref model) = self.summary_model {
            overrides = overrides.with_summary_model(model.clone());
        }
        if let Some(policy) = self.cancel_policy {
            overrides = overrides.with_cancel_policy(policy);
        }
        overrides
    }
}

/// Print streamed chunks until the channel closes or stdout goes away
///
/// `on_broken` runs once when a write fails (e.g. `chorus ask | head`).
fn spawn_printer(
    rx: mpsc::Receiver<ConductorMessage>,
    quiet: bool,
    on_broken: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(run_printer(rx, std::io::stdout(), quiet, on_broken))
}

async fn run_printer<W: Write>(
    mut rx: mpsc::Receiver<ConductorMessage>,
    mut out: W,
    quiet: bool,
    on_broken: impl FnOnce(),
) {
    let mut current: Option<String> = None;
    while let Some(msg) = rx.recv().await {
        if let Err(e) = print_message(&mut out, &mut current, msg, quiet) {
            debug!(error = %e, "Output closed, stopping");
            on_broken();
            return;
        }
    }
}

/// Write one message, with a header on each provider switch
fn print_message<W: Write>(
    out: &mut W,
    current: &mut Option<String>,
    msg: ConductorMessage,
    quiet: bool,
) -> std::io::Result<()> {
    match msg {
        ConductorMessage::ResponseUpdated {
            provider, chunk, ..
        } if !quiet => {
            if current.as_deref() != Some(provider.as_str()) {
                write!(out, "\n\n[{provider}]\n")?;
                *current = Some(provider);
            }
            write!(out, "{chunk}")?;
            out.flush()?;
        }
        ConductorMessage::TurnFinalized {
            turn_id,
            session_id,
            default_provider,
            ..
        } if !quiet => {
            writeln!(out)?;
            out.flush()?;
            eprintln!(
                "\nturn {turn_id} saved in session {session_id} (default: {})",
                default_provider.as_deref().unwrap_or("none")
            );
        }
        ConductorMessage::Notice { message } => eprintln!("error: {message}"),
        other => debug!(message = ?other, "Conductor message"),
    }
    Ok(())
}

fn print_turn(turn: &ChatTurn, selected: Option<&str>) {
    println!("> {}", turn.prompt);
    let response = selected
        .and_then(|provider| turn.response(provider))
        .or_else(|| turn.responses.first());
    match response {
        Some(r) => println!("[{}]\n{}\n", r.provider, r.content),
        None => println!("(no answers)\n"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(
        source = %config.source(),
        base_url = %config.backend.base_url,
        "Configuration resolved"
    );

    let credentials = Arc::new(StaticCredentials::from_option(
        config.backend.api_token.clone(),
    ));
    let backend = HttpBackend::from_settings(&config.backend, credentials)
        .context("Failed to create HTTP backend")?;

    let (tx, rx) = mpsc::channel(config.chat.message_capacity);
    let mut conductor = Conductor::new(backend, config.chat.clone(), tx);

    match args.command {
        Command::Ask {
            prompt,
            session,
            json,
        } => {
            let stop = conductor.shutdown_token();
            let printer = spawn_printer(rx, json, move || stop.cancel());

            if let Some(id) = session {
                conductor
                    .load_session(SessionId(id))
                    .await
                    .with_context(|| format!("Failed to load session {id}"))?;
            }

            let shutdown = conductor.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel();
                }
            });

            let outcome = conductor.send(&prompt).await;
            let turn = conductor.turns().last().cloned();
            drop(conductor);
            let _ = printer.await;

            if json {
                if let Some(ref turn) = turn {
                    println!("{}", serde_json::to_string_pretty(turn)?);
                }
            }

            match outcome {
                SendOutcome::Finalized(_) => Ok(()),
                SendOutcome::Skipped(SkipReason::EmptyPrompt) => bail!("Prompt is empty"),
                SendOutcome::Skipped(SkipReason::SendInProgress) => {
                    bail!("Another request is in progress")
                }
                SendOutcome::Failed(TurnFailure::Cancelled) => bail!("Cancelled"),
                SendOutcome::Failed(failure) => bail!("{failure}"),
            }
        }

        Command::Sessions { json } => {
            drop(rx);
            conductor
                .refresh_sessions()
                .await
                .context("Failed to list sessions")?;
            if json {
                println!("{}", serde_json::to_string_pretty(conductor.sessions())?);
            } else {
                for session in conductor.sessions() {
                    println!(
                        "{:>6}  {}  {}",
                        session.id,
                        session.last_used.as_deref().unwrap_or("-"),
                        session.title
                    );
                }
            }
            Ok(())
        }

        Command::Show { id, json } => {
            drop(rx);
            conductor
                .load_session(SessionId(id))
                .await
                .with_context(|| format!("Failed to load session {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(conductor.turns())?);
            } else {
                for turn in conductor.turns() {
                    print_turn(turn, conductor.selected_provider(turn.turn_id));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Writer whose reader went away
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn chunk(provider: &str, chunk: &str) -> ConductorMessage {
        ConductorMessage::ResponseUpdated {
            turn: chorus_core::TurnIdentity::Pending(chorus_core::TempTurnId(1)),
            provider: provider.to_string(),
            index: 0,
            chunk: chunk.to_string(),
        }
    }

    #[test]
    fn test_header_on_provider_switch() {
        let mut out = Vec::new();
        let mut current = None;
        for msg in [chunk("gemini", "Hel"), chunk("gemini", "lo"), chunk("deepseek", "Hi")] {
            print_message(&mut out, &mut current, msg, false).unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\n\n[gemini]\nHello\n\n[deepseek]\nHi"
        );
    }

    #[test]
    fn test_quiet_prints_nothing() {
        let mut out = Vec::new();
        let mut current = None;
        print_message(&mut out, &mut current, chunk("gemini", "Hel"), true).unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_printer_stops_on_closed_output() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(chunk("gemini", "Hel")).await.unwrap();
        tx.send(chunk("gemini", "lo")).await.unwrap();

        let broken = AtomicBool::new(false);
        run_printer(rx, ClosedPipe, false, || broken.store(true, Ordering::SeqCst)).await;

        // Returned while the sender is still alive, receiver dropped
        assert!(broken.load(Ordering::SeqCst));
        assert!(tx.is_closed());
    }
}
