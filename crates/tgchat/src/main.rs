//! tgchat: chat with other processes on this host.
//!
//! # Usage
//!
//! ```bash
//! # Create a room
//! tgchat
//!
//! # Join the room of participant 1000
//! tgchat 1000
//! ```
//!
//! Set `RUST_LOG=tgchat=debug` to see the join handshake and deliveries on
//! stderr.

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tgchat::config::{Args, ChatConfig};
use tgchat::notify::signal::{self, SignalNotifier};
use tgchat::{ChatError, ParticipantId, Session, console};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Chat goes to stdout; logs go to stderr without timestamps.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => exit_code(&ChatError::Usage(e.to_string())),
            };
        }
    };

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tgchat: {e}");
            return exit_code(&e);
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let e = ChatError::Signal(format!("failed to start runtime: {e}"));
            eprintln!("tgchat: {e}");
            return exit_code(&e);
        }
    };

    let result = rt.block_on(run(&config, args.join_pid));
    // Don't wait for the blocking stdin reader.
    rt.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tgchat: {e}");
            exit_code(&e)
        }
    }
}

async fn run(config: &ChatConfig, join_pid: Option<ParticipantId>) -> Result<(), ChatError> {
    let me = ParticipantId::current();
    let mut inbox = signal::install()?;

    let session = match join_pid {
        None => Session::create(config, me, SignalNotifier)?,
        Some(known) => Session::join(config, me, known, SignalNotifier, &mut inbox).await?,
    };

    let input = BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    let result = console::run(&session, &mut inbox, input, &mut out).await;

    // Departure runs on every path out of the loop, including end of input.
    match (result, session.leave()) {
        (Ok(()), departure) => departure.map(drop),
        (Err(e), Err(leave)) => {
            tracing::error!(error = %leave, "leaving the room failed");
            Err(e)
        }
        (Err(e), Ok(_)) => Err(e),
    }
}

fn exit_code(e: &ChatError) -> ExitCode {
    ExitCode::from(e.exit_code() as u8)
}
