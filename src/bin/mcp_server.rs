//! Standalone MCP server binary.
//!
//! Speaks JSON-RPC 2.0 over stdio, so logs go to stderr. The recording
//! user is the subject of the bearer token in `MCP_BEARER_TOKEN`; without
//! one, writes are recorded as anonymous.

use anyhow::Result;
use clap::Parser;
use project_governor::{auth, mcp::McpServer, AppState, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mcp_server")]
#[command(about = "MCP stdio server for the governance core")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "GOVERNOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the protocol; all diagnostics go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,project_governor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let token = std::env::var("MCP_BEARER_TOKEN").ok();
    let bearer = token.as_deref().map(|t| format!("Bearer {}", t));
    let user = auth::subject_from_bearer(bearer.as_deref(), config.jwt.secret.as_deref());

    let state = Arc::new(AppState::new(config)?);
    let mut server = McpServer::new(state, user);
    server.run().await
}
