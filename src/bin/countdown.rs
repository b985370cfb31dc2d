//! Terminal countdown for a live attempt.
//!
//! Reads page events from stdin, one per line: `hide`, `show`, `exit` or
//! `close`. End of input, Ctrl+C and SIGTERM count as closing the page; the
//! attempt is still reported finished before the process exits.
//!
//! # Environment Variables
//!
//! - `WL_GATE_URL` — gate server base URL (default: http://127.0.0.1:10000)
//! - `WL_SESSION` — session token issued by the gate (required)
//! - `WL_LEDGER_PATH` — penalty ledger file (default: .wl_penalties.json)
//! - `RUST_LOG` — Tracing filter (default: "warn,whitelist_gate=info")

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use whitelist_gate::clock::SystemClock;
use whitelist_gate::countdown::{
    CountdownSession, FileLedgerStore, HttpControllerClient, SessionError, SessionEvent,
};
use whitelist_gate::server::shutdown_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,whitelist_gate=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let base_url =
        std::env::var("WL_GATE_URL").unwrap_or_else(|_| "http://127.0.0.1:10000".to_string());
    let token = std::env::var("WL_SESSION").context("WL_SESSION is not set")?;
    let ledger_path =
        std::env::var("WL_LEDGER_PATH").unwrap_or_else(|_| ".wl_penalties.json".to_string());

    let client = HttpControllerClient::new(base_url, token)?;
    let ledgers = FileLedgerStore::new(ledger_path);
    tracing::debug!(path = %ledgers.path().display(), "Penalty ledger");
    let session = CountdownSession::new(Arc::new(client), Arc::new(ledgers), Arc::new(SystemClock));

    let handle = match session.start().await {
        Ok(handle) => handle,
        Err(SessionError::NoLiveAttempt) => {
            println!("No attempt in progress. Start one first.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut view = handle.view();
    {
        let current = view.borrow_and_update();
        println!(
            "Form {} for {}: {} left",
            current.form_variant,
            current.user_id,
            current.clock_text()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let closed = shutdown_signal();
    tokio::pin!(closed);
    let mut closing = false;
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                match current.ended {
                    Some(reason) => {
                        println!("Countdown over ({:?})", reason);
                        break;
                    }
                    None => println!(
                        "{} left (penalty {}s)",
                        current.clock_text(),
                        current.penalty_seconds
                    ),
                }
            }
            _ = &mut closed, if !closing => {
                closing = true;
                handle.send(SessionEvent::Teardown).await;
            }
            line = lines.next_line(), if stdin_open => {
                let event = match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match SessionEvent::from_command(&line) {
                        Some(event) => event,
                        None => {
                            eprintln!("Unknown command: {} (hide, show, exit, close)", line.trim());
                            continue;
                        }
                    },
                    Ok(None) => {
                        stdin_open = false;
                        SessionEvent::Teardown
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                        SessionEvent::Teardown
                    }
                };
                handle.send(event).await;
            }
        }
    }

    let termination = handle.join().await.context("Countdown task failed")?;
    tracing::info!(reason = ?termination.reason, "Attempt closed");

    // A pending stdin read would otherwise keep the runtime from shutting down.
    std::process::exit(0)
}
