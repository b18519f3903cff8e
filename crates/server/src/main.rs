// crates/server/src/main.rs
//! bulksend server binary.
//!
//! Reads configuration from flags and the environment, wires the Bot-API
//! transport into a job registry and serves the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use bulksend_jobs::JobRegistry;
use bulksend_server::{create_app, AppState, Cli, ServerConfig, TelegramTransport};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,bulksend_server=info,bulksend_jobs=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_cli(&cli);

    if config.bot_token.is_none() {
        tracing::warn!("BULKSEND_BOT_TOKEN is not set; job submissions will be refused");
    }

    let transport = TelegramTransport::new(config.api_base.clone(), config.bot_token.clone())
        .with_timeout(config.runner.request_timeout);
    let registry = JobRegistry::new(Arc::new(transport), config.runner.clone());
    let app = create_app(AppState::new(registry));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, "bulksend listening");

    axum::serve(listener, app).await?;
    Ok(())
}
