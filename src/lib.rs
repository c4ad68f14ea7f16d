//! Project Governor
//!
//! Governance core for an AI-assisted development platform:
//! - Versioned document store (append-only chunk logs + compiled views)
//! - Execution-plan engine with dependency-aware scheduling
//! - Layered MCP prompt-template registry with cache invalidation
//! - Health-probed audio transcription chain with graceful degradation

pub mod api;
pub mod audio;
pub mod auth;
pub mod config;
pub mod docs;
pub mod error;
pub mod mcp;
pub mod plan;
pub mod prompts;

pub use config::Config;
pub use error::{CoreError, CoreResult};

use anyhow::Result;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<docs::DocStore>,
    pub plans: Arc<plan::PlanEngine>,
    pub prompts: Arc<prompts::PromptRegistry>,
    pub audio: Arc<audio::AudioOrchestrator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state with all subsystems initialized
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(docs::DocStore::new(&config));
        let plans = Arc::new(plan::PlanEngine::new(store.clone()));
        let prompts = Arc::new(prompts::PromptRegistry::new(
            config.prompts_dir.clone(),
            config.data_root.clone(),
            config.prompts_cache_ttl_minutes,
        ));
        let audio = Arc::new(audio::AudioOrchestrator::from_config(&config.audio));

        Ok(Self {
            store,
            plans,
            prompts,
            audio,
            config: Arc::new(config),
        })
    }
}
