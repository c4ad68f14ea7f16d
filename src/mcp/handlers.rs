//! MCP tool dispatch into the governance core.

use crate::audio::TranscriptionOptions;
use crate::docs::{AppendRequest, ChunkOp, ChunkSource, DocRef, DocumentScope, Slot};
use crate::error::CoreError;
use crate::plan::{NextStep, StepStatus};
use crate::AppState;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Routes `tools/call` requests to the core subsystems. Every write is
/// recorded with the server's authenticated user and `source=mcp`.
pub struct ToolHandler {
    state: Arc<AppState>,
    user: String,
}

#[derive(Debug, Deserialize)]
struct ScopeArgs {
    scope: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    meeting_id: Option<String>,
    slot: String,
}

impl ScopeArgs {
    fn doc_ref(&self) -> Result<DocRef, CoreError> {
        let scope = match self.scope.as_str() {
            "project" => DocumentScope::Project {
                project_id: self.require("project_id", &self.project_id)?,
            },
            "task" => DocumentScope::Task {
                project_id: self.require("project_id", &self.project_id)?,
                task_id: self.require("task_id", &self.task_id)?,
            },
            "meeting" => DocumentScope::Meeting {
                meeting_id: self.require("meeting_id", &self.meeting_id)?,
            },
            other => return Err(CoreError::InvalidScope(other.to_string())),
        };
        let slot = Slot::parse(&self.slot).ok_or_else(|| CoreError::InvalidSlot {
            scope: scope.name().to_string(),
            slot: self.slot.clone(),
        })?;
        DocRef::new(scope, slot)
    }

    fn require(&self, name: &str, value: &Option<String>) -> Result<String, CoreError> {
        value
            .clone()
            .ok_or_else(|| CoreError::MissingArgument(name.to_string()))
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Option<Value>) -> Result<T> {
    let value = arguments.clone().unwrap_or_else(|| json!({}));
    Ok(serde_json::from_value(value)?)
}

impl ToolHandler {
    pub fn new(state: Arc<AppState>, user: String) -> Self {
        Self { state, user }
    }

    /// Handle one tool call; the returned value is serialized as the tool
    /// result text.
    pub async fn handle(&self, name: &str, arguments: Option<Value>) -> Result<Value> {
        match name {
            "export_document" => self.export_document(&arguments).await,
            "append_document" => self.append_document(&arguments).await,
            "list_chunks" => self.list_chunks(&arguments).await,
            "squash_document" => self.squash_document(&arguments).await,
            "get_sections" => self.get_sections(&arguments).await,
            "get_section" => self.get_section(&arguments).await,
            "update_section" => self.update_section(&arguments).await,
            "insert_section" => self.insert_section(&arguments).await,
            "delete_section" => self.delete_section(&arguments).await,
            "sync_sections" => self.sync_sections(&arguments).await,
            "get_execution_plan" => self.get_execution_plan(&arguments).await,
            "save_execution_plan" => self.save_execution_plan(&arguments).await,
            "get_next_step" => self.get_next_step(&arguments).await,
            "update_step_status" => self.update_step_status(&arguments).await,
            "transcribe_meeting" => self.transcribe_meeting(&arguments).await,
            "get_audio_health" => self.get_audio_health().await,
            _ => anyhow::bail!("Unknown tool: {}", name),
        }
    }

    // ========================================================================
    // Documents
    // ========================================================================

    async fn export_document(&self, arguments: &Option<Value>) -> Result<Value> {
        let args: ScopeArgs = parse_args(arguments)?;
        let export = self.state.store.export(&args.doc_ref()?).await?;
        Ok(serde_json::to_value(export)?)
    }

    async fn append_document(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(flatten)]
            scope: ScopeArgs,
            content: String,
            #[serde(default)]
            op: Option<String>,
            #[serde(default)]
            expected_version: Option<u64>,
        }
        let args: Args = parse_args(arguments)?;
        let op = match args.op.as_deref() {
            None | Some("append") => ChunkOp::Append,
            Some("replace") => ChunkOp::Replace,
            Some(other) => anyhow::bail!("unknown op: {}", other),
        };
        let mut request = AppendRequest {
            content: args.content,
            user: self.user.clone(),
            source: ChunkSource::Mcp,
            op,
            expected_version: None,
        };
        if let Some(version) = args.expected_version {
            request = request.with_expected_version(version);
        }
        let outcome = self.state.store.append(&args.scope.doc_ref()?, request).await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn list_chunks(&self, arguments: &Option<Value>) -> Result<Value> {
        let args: ScopeArgs = parse_args(arguments)?;
        let chunks = self.state.store.list_chunks(&args.doc_ref()?).await?;
        Ok(json!({ "chunks": chunks }))
    }

    async fn squash_document(&self, arguments: &Option<Value>) -> Result<Value> {
        let args: ScopeArgs = parse_args(arguments)?;
        let outcome = self
            .state
            .store
            .squash(&args.doc_ref()?, &self.user, ChunkSource::Mcp)
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }

    // ========================================================================
    // Sections
    // ========================================================================

    async fn get_sections(&self, arguments: &Option<Value>) -> Result<Value> {
        let args: ScopeArgs = parse_args(arguments)?;
        let sections = self.state.store.get_sections(&args.doc_ref()?).await?;
        Ok(json!({ "sections": sections }))
    }

    async fn get_section(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(flatten)]
            scope: ScopeArgs,
            section_id: String,
            #[serde(default)]
            include_children: bool,
        }
        let args: Args = parse_args(arguments)?;
        let section = self
            .state
            .store
            .get_section(&args.scope.doc_ref()?, &args.section_id, args.include_children)
            .await?;
        Ok(serde_json::to_value(section)?)
    }

    async fn update_section(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(flatten)]
            scope: ScopeArgs,
            section_id: String,
            content: String,
            #[serde(default)]
            expected_version: Option<u64>,
        }
        let args: Args = parse_args(arguments)?;
        let outcome = self
            .state
            .store
            .update_section(
                &args.scope.doc_ref()?,
                &args.section_id,
                &args.content,
                args.expected_version,
                &self.user,
                ChunkSource::Mcp,
            )
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn insert_section(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(flatten)]
            scope: ScopeArgs,
            title: String,
            content: String,
            #[serde(default)]
            after_section_id: Option<String>,
            #[serde(default)]
            expected_version: Option<u64>,
        }
        let args: Args = parse_args(arguments)?;
        let outcome = self
            .state
            .store
            .insert_section(
                &args.scope.doc_ref()?,
                &args.title,
                &args.content,
                args.after_section_id.as_deref(),
                args.expected_version,
                &self.user,
                ChunkSource::Mcp,
            )
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn delete_section(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(flatten)]
            scope: ScopeArgs,
            section_id: String,
            #[serde(default)]
            cascade: bool,
            #[serde(default)]
            expected_version: Option<u64>,
        }
        let args: Args = parse_args(arguments)?;
        let outcome = self
            .state
            .store
            .delete_section(
                &args.scope.doc_ref()?,
                &args.section_id,
                args.cascade,
                args.expected_version,
                &self.user,
                ChunkSource::Mcp,
            )
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn sync_sections(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(flatten)]
            scope: ScopeArgs,
            direction: crate::docs::SyncDirection,
        }
        let args: Args = parse_args(arguments)?;
        let outcome = self
            .state
            .store
            .sync_sections(&args.scope.doc_ref()?, args.direction, &self.user, ChunkSource::Mcp)
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }

    // ========================================================================
    // Execution plan
    // ========================================================================

    async fn get_execution_plan(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            project_id: String,
            task_id: String,
        }
        let args: Args = parse_args(arguments)?;
        let (plan, version) = self.state.plans.load(&args.project_id, &args.task_id).await?;
        Ok(json!({
            "plan_id": plan.front.plan_id,
            "task_id": plan.front.task_id,
            "status": plan.front.status,
            "dependencies": plan.front.dependencies,
            "steps": plan.steps,
            "version": version,
            "content": crate::plan::parser::emit(&plan),
        }))
    }

    async fn save_execution_plan(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            project_id: String,
            task_id: String,
            content: String,
            #[serde(default)]
            expected_version: Option<u64>,
        }
        let args: Args = parse_args(arguments)?;
        let mut plan = crate::plan::parser::parse(&args.content)?;
        let outcome = self
            .state
            .plans
            .save(
                &args.project_id,
                &args.task_id,
                &mut plan,
                args.expected_version,
                &self.user,
                ChunkSource::Mcp,
            )
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn get_next_step(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            project_id: String,
            task_id: String,
        }
        let args: Args = parse_args(arguments)?;
        let next = self
            .state
            .plans
            .next_step_for(&args.project_id, &args.task_id)
            .await?;
        Ok(match next {
            NextStep::Ready(step) => json!({ "empty": false, "step": step }),
            NextStep::Empty(reason) => json!({ "empty": true, "reason": reason }),
        })
    }

    async fn update_step_status(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            project_id: String,
            task_id: String,
            step_id: String,
            status: String,
            #[serde(default)]
            output: Option<String>,
        }
        let args: Args = parse_args(arguments)?;
        let status = StepStatus::parse(&args.status)
            .ok_or_else(|| anyhow::anyhow!("unknown status: {}", args.status))?;
        let step = self
            .state
            .plans
            .update_step(
                &args.project_id,
                &args.task_id,
                &args.step_id,
                status,
                args.output.as_deref(),
                &self.user,
                ChunkSource::Mcp,
            )
            .await?;
        Ok(serde_json::to_value(step)?)
    }

    // ========================================================================
    // Audio
    // ========================================================================

    async fn transcribe_meeting(&self, arguments: &Option<Value>) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            meeting_id: String,
            wav_path: PathBuf,
            #[serde(default)]
            model: Option<String>,
            #[serde(default)]
            language: Option<String>,
        }
        let args: Args = parse_args(arguments)?;
        let mut options = TranscriptionOptions::default();
        if let Some(model) = args.model {
            options.model = model;
        }
        options.language = args.language;

        let (transcript, document) = self
            .state
            .audio
            .transcribe_meeting(
                &self.state.store,
                &args.meeting_id,
                &CancellationToken::new(),
                &args.wav_path,
                &options,
                &self.user,
                ChunkSource::Mcp,
            )
            .await?;
        Ok(json!({ "transcript": transcript, "document": document }))
    }

    async fn get_audio_health(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.state.audio.health().await)?)
    }
}
