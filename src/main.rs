//! Project Governor - Main Server
//!
//! Governance core server: versioned documents, execution plans, prompt
//! registry, and audio transcription orchestration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use project_governor::{api, docs, AppState, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "governor")]
#[command(about = "Governance core for AI-assisted development")]
struct Cli {
    /// Path to the YAML config file (falls back to GOVERNOR_CONFIG, then
    /// pure env configuration)
    #[arg(short, long, env = "GOVERNOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the governance server
    Serve {
        /// Listen address override, e.g. 0.0.0.0:8080
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Squash a document's chunk log from the command line
    Squash {
        /// Scope kind: project, task, or meeting
        #[arg(long)]
        scope: String,
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long)]
        task_id: Option<String>,
        #[arg(long)]
        meeting_id: Option<String>,
        #[arg(long)]
        slot: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,project_governor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Serve { listen } => run_server(config, listen).await,
        Commands::Squash {
            scope,
            project_id,
            task_id,
            meeting_id,
            slot,
        } => run_squash(config, &scope, project_id, task_id, meeting_id, &slot).await,
    }
}

async fn run_server(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.http.listen = listen;
    }

    tracing::info!("Starting Project Governor server...");
    tracing::info!("Data root: {}", config.data_root.display());
    if config.http.tls_cert.is_some() {
        tracing::warn!("http.tls_cert is set but TLS termination happens at the fronting proxy");
    }

    let listen = config.http.listen.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = api::create_router(state);

    tracing::info!("Server listening on {}", listen);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_squash(
    config: Config,
    scope: &str,
    project_id: Option<String>,
    task_id: Option<String>,
    meeting_id: Option<String>,
    slot: &str,
) -> Result<()> {
    let scope = match scope {
        "project" => docs::DocumentScope::Project {
            project_id: project_id.context("--project-id is required for project scope")?,
        },
        "task" => docs::DocumentScope::Task {
            project_id: project_id.context("--project-id is required for task scope")?,
            task_id: task_id.context("--task-id is required for task scope")?,
        },
        "meeting" => docs::DocumentScope::Meeting {
            meeting_id: meeting_id.context("--meeting-id is required for meeting scope")?,
        },
        other => anyhow::bail!("unknown scope: {}", other),
    };
    let slot = docs::Slot::parse(slot).with_context(|| format!("unknown slot: {}", slot))?;
    let doc = docs::DocRef::new(scope, slot)?;

    let state = AppState::new(config)?;
    let outcome = state
        .store
        .squash(&doc, "operator", docs::ChunkSource::Cli)
        .await?;

    if outcome.duplicate {
        tracing::info!("Nothing to squash (log already compact)");
    } else {
        tracing::info!(
            "Squashed to sequence {} (version {})",
            outcome.sequence,
            outcome.version
        );
    }

    Ok(())
}
