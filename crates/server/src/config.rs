// crates/server/src/config.rs
//! Process configuration: CLI flags first, then environment, then defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bulksend_jobs::RunnerConfig;
use clap::Parser;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

/// Default Bot API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Command-line flags. Anything not given here falls back to the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "bulksend", version, about = "Bulk image+caption delivery server")]
pub struct Cli {
    /// Port to listen on (overrides BULKSEND_PORT / PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (default 127.0.0.1).
    #[arg(long)]
    pub host: Option<IpAddr>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Bot token; `None` means jobs are refused with "configuration missing".
    pub bot_token: Option<String>,
    pub api_base: String,
    pub runner: RunnerConfig,
}

impl ServerConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary variable lookup (the environment in
    /// production, a map in tests).
    pub fn resolve(cli: &Cli, var: impl Fn(&str) -> Option<String>) -> Self {
        let port = cli
            .port
            .or_else(|| parse_var(&var, "BULKSEND_PORT"))
            .or_else(|| parse_var(&var, "PORT"))
            .unwrap_or(DEFAULT_PORT);
        let host = cli.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let mut runner = RunnerConfig::default();
        if let Some(template) = var("BULKSEND_CAPTION_TEMPLATE") {
            // Allow "\n" escapes from shells and .env files.
            runner.caption_template = template.replace("\\n", "\n");
        }
        if let Some(ms) = parse_var::<u64>(&var, "BULKSEND_INTER_MESSAGE_DELAY_MS") {
            runner.inter_message_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&var, "BULKSEND_RETENTION_SECS") {
            runner.retention = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<u32>(&var, "BULKSEND_MAX_ATTEMPTS") {
            runner.max_attempts = n.max(1);
        }

        Self {
            addr: SocketAddr::new(host, port),
            bot_token: var("BULKSEND_BOT_TOKEN").filter(|t| !t.trim().is_empty()),
            api_base: var("BULKSEND_API_BASE")
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            runner,
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}
