//! whitelist-gate HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 10000)
//! - `WL_COOLDOWN_HOURS` / `WL_ATTEMPT_MINUTES` — lifecycle (default: 12 / 25)
//! - `DISCORD_BOT_TOKEN`, `DISCORD_GUILD_ID`, `DISCORD_WL_ROLE_ID` — role lookup
//! - `WL_FORM_A_URL`, `WL_FORM_A_FIELD`, `WL_FORM_B_URL`, `WL_FORM_B_FIELD` — forms
//! - `WL_DEV_USER` — issue a session for this user id at startup (local runs)
//! - `RUST_LOG` — Tracing filter (default: "info,whitelist_gate=debug")
//!
//! # Usage
//!
//! ```bash
//! WL_DEV_USER=1234 cargo run --bin server
//! ```

use anyhow::Context;
use whitelist_gate::attempt::UserId;
use whitelist_gate::config::GateConfig;
use whitelist_gate::server::{app_router, shutdown_signal, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,whitelist_gate=debug".into()),
        )
        .init();

    let config = GateConfig::from_env().context("Invalid configuration")?;
    let bind_addr = format!("0.0.0.0:{}", config.port);

    let state = AppState::from_config(&config).context("Failed to build eligibility client")?;

    if let Ok(user) = std::env::var("WL_DEV_USER") {
        let token = state.sessions.issue(UserId::new(user.clone()));
        tracing::warn!(user = %user, token = %token, "Issued development session");
    }

    let app = app_router(state);

    tracing::info!("whitelist-gate {} starting on {}", whitelist_gate::VERSION, bind_addr);
    tracing::info!(
        cooldown_hours = config.lifecycle.cooldown_hours,
        attempt_minutes = config.lifecycle.attempt_minutes,
        "Attempt lifecycle"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}
