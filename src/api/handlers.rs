//! API request handlers

use crate::audio::TranscriptionOptions;
use crate::auth::subject_from_bearer;
use crate::docs::{
    AppendOutcome, AppendRequest, ChunkOp, ChunkRecord, ChunkSource, DocRef, DocumentScope,
    ExportResult, Section, SectionContent, Slot, SyncDirection, SyncOutcome,
};
use crate::error::CoreError;
use crate::plan::{EmptyReason, NextStep, PlanDocument, StepStatus};
use crate::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared server state
pub type ServerState = Arc<AppState>;

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check handler
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Scope / slot resolution
// ============================================================================

fn scope_from(kind: &str, id: String) -> Result<DocumentScope, AppError> {
    match kind {
        "projects" => Ok(DocumentScope::Project { project_id: id }),
        "meetings" => Ok(DocumentScope::Meeting { meeting_id: id }),
        other => Err(CoreError::InvalidScope(other.to_string()).into()),
    }
}

fn doc_ref(scope: DocumentScope, slot: &str) -> Result<DocRef, AppError> {
    let parsed = Slot::parse(slot).ok_or_else(|| CoreError::InvalidSlot {
        scope: scope.name().to_string(),
        slot: slot.to_string(),
    })?;
    Ok(DocRef::new(scope, parsed)?)
}

fn task_doc_ref(project_id: String, task_id: String, slot: &str) -> Result<DocRef, AppError> {
    doc_ref(
        DocumentScope::Task {
            project_id,
            task_id,
        },
        slot,
    )
}

fn recording_user(state: &AppState, headers: &HeaderMap) -> String {
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    subject_from_bearer(authorization, state.config.jwt.secret.as_deref())
}

fn parse_source(source: Option<&str>) -> Result<ChunkSource, AppError> {
    match source {
        None | Some("api") => Ok(ChunkSource::Api),
        Some("ui") => Ok(ChunkSource::Ui),
        Some(other) => {
            Err(AppError::bad_request(format!("unknown source: {}", other)))
        }
    }
}

// ============================================================================
// Document operations
// ============================================================================

/// Body of an append call
#[derive(Debug, Deserialize)]
pub struct AppendBody {
    pub content: String,
    /// "append" (default) or "replace"
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
    /// "api" (default) or "ui"
    #[serde(default)]
    pub source: Option<String>,
}

async fn do_export(state: &AppState, doc: DocRef) -> Result<Json<ExportResult>, AppError> {
    Ok(Json(state.store.export(&doc).await?))
}

async fn do_append(
    state: &AppState,
    doc: DocRef,
    headers: &HeaderMap,
    body: AppendBody,
) -> Result<Json<AppendOutcome>, AppError> {
    let op = match body.op.as_deref() {
        None | Some("append") => ChunkOp::Append,
        Some("replace") => ChunkOp::Replace,
        Some(other) => return Err(AppError::bad_request(format!("unknown op: {}", other))),
    };
    let mut request = AppendRequest {
        content: body.content,
        user: recording_user(state, headers),
        source: parse_source(body.source.as_deref())?,
        op,
        expected_version: None,
    };
    if let Some(version) = body.expected_version {
        request = request.with_expected_version(version);
    }
    Ok(Json(state.store.append(&doc, request).await?))
}

#[derive(Serialize)]
pub struct ChunksResponse {
    pub chunks: Vec<ChunkRecord>,
}

async fn do_list_chunks(state: &AppState, doc: DocRef) -> Result<Json<ChunksResponse>, AppError> {
    let chunks = state.store.list_chunks(&doc).await?;
    Ok(Json(ChunksResponse { chunks }))
}

async fn do_squash(
    state: &AppState,
    doc: DocRef,
    headers: &HeaderMap,
) -> Result<Json<AppendOutcome>, AppError> {
    let user = recording_user(state, headers);
    Ok(Json(
        state.store.squash(&doc, &user, ChunkSource::Api).await?,
    ))
}

// --- project/meeting scope wrappers ---

pub async fn export_doc(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
) -> Result<Json<ExportResult>, AppError> {
    do_export(&state, doc_ref(scope_from(&kind, id)?, &slot)?).await
}

pub async fn append_doc(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<AppendBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_append(&state, doc_ref(scope_from(&kind, id)?, &slot)?, &headers, body).await
}

pub async fn list_doc_chunks(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
) -> Result<Json<ChunksResponse>, AppError> {
    do_list_chunks(&state, doc_ref(scope_from(&kind, id)?, &slot)?).await
}

pub async fn squash_doc(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<AppendOutcome>, AppError> {
    do_squash(&state, doc_ref(scope_from(&kind, id)?, &slot)?, &headers).await
}

// --- task scope wrappers ---

pub async fn export_task_doc(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
) -> Result<Json<ExportResult>, AppError> {
    do_export(&state, task_doc_ref(pid, tid, &slot)?).await
}

pub async fn append_task_doc(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<AppendBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_append(&state, task_doc_ref(pid, tid, &slot)?, &headers, body).await
}

pub async fn list_task_doc_chunks(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
) -> Result<Json<ChunksResponse>, AppError> {
    do_list_chunks(&state, task_doc_ref(pid, tid, &slot)?).await
}

pub async fn squash_task_doc(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<AppendOutcome>, AppError> {
    do_squash(&state, task_doc_ref(pid, tid, &slot)?, &headers).await
}

// ============================================================================
// Section operations
// ============================================================================

#[derive(Serialize)]
pub struct SectionsResponse {
    pub sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
pub struct SectionQuery {
    #[serde(default)]
    pub include_children: bool,
}

#[derive(Debug, Deserialize)]
pub struct SectionUpdateBody {
    pub content: String,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SectionInsertBody {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub after_section_id: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SectionDeleteQuery {
    #[serde(default)]
    pub cascade: bool,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SectionSyncBody {
    pub direction: SyncDirection,
}

async fn do_get_sections(
    state: &AppState,
    doc: DocRef,
) -> Result<Json<SectionsResponse>, AppError> {
    let sections = state.store.get_sections(&doc).await?;
    Ok(Json(SectionsResponse { sections }))
}

async fn do_get_section(
    state: &AppState,
    doc: DocRef,
    section_id: &str,
    include_children: bool,
) -> Result<Json<SectionContent>, AppError> {
    Ok(Json(
        state
            .store
            .get_section(&doc, section_id, include_children)
            .await?,
    ))
}

async fn do_update_section(
    state: &AppState,
    doc: DocRef,
    section_id: &str,
    headers: &HeaderMap,
    body: SectionUpdateBody,
) -> Result<Json<AppendOutcome>, AppError> {
    let user = recording_user(state, headers);
    Ok(Json(
        state
            .store
            .update_section(
                &doc,
                section_id,
                &body.content,
                body.expected_version,
                &user,
                ChunkSource::Api,
            )
            .await?,
    ))
}

async fn do_insert_section(
    state: &AppState,
    doc: DocRef,
    headers: &HeaderMap,
    body: SectionInsertBody,
) -> Result<Json<AppendOutcome>, AppError> {
    let user = recording_user(state, headers);
    Ok(Json(
        state
            .store
            .insert_section(
                &doc,
                &body.title,
                &body.content,
                body.after_section_id.as_deref(),
                body.expected_version,
                &user,
                ChunkSource::Api,
            )
            .await?,
    ))
}

async fn do_delete_section(
    state: &AppState,
    doc: DocRef,
    section_id: &str,
    headers: &HeaderMap,
    query: SectionDeleteQuery,
) -> Result<Json<AppendOutcome>, AppError> {
    let user = recording_user(state, headers);
    Ok(Json(
        state
            .store
            .delete_section(
                &doc,
                section_id,
                query.cascade,
                query.expected_version,
                &user,
                ChunkSource::Api,
            )
            .await?,
    ))
}

async fn do_sync_sections(
    state: &AppState,
    doc: DocRef,
    headers: &HeaderMap,
    body: SectionSyncBody,
) -> Result<Json<SyncOutcome>, AppError> {
    let user = recording_user(state, headers);
    Ok(Json(
        state
            .store
            .sync_sections(&doc, body.direction, &user, ChunkSource::Api)
            .await?,
    ))
}

// --- project/meeting scope wrappers ---

pub async fn get_sections(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
) -> Result<Json<SectionsResponse>, AppError> {
    do_get_sections(&state, doc_ref(scope_from(&kind, id)?, &slot)?).await
}

pub async fn get_section(
    State(state): State<ServerState>,
    Path((kind, id, slot, sid)): Path<(String, String, String, String)>,
    Query(query): Query<SectionQuery>,
) -> Result<Json<SectionContent>, AppError> {
    do_get_section(
        &state,
        doc_ref(scope_from(&kind, id)?, &slot)?,
        &sid,
        query.include_children,
    )
    .await
}

pub async fn update_section(
    State(state): State<ServerState>,
    Path((kind, id, slot, sid)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<SectionUpdateBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_update_section(&state, doc_ref(scope_from(&kind, id)?, &slot)?, &sid, &headers, body).await
}

pub async fn insert_section(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<SectionInsertBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_insert_section(&state, doc_ref(scope_from(&kind, id)?, &slot)?, &headers, body).await
}

pub async fn delete_section(
    State(state): State<ServerState>,
    Path((kind, id, slot, sid)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Query(query): Query<SectionDeleteQuery>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_delete_section(&state, doc_ref(scope_from(&kind, id)?, &slot)?, &sid, &headers, query).await
}

pub async fn sync_sections(
    State(state): State<ServerState>,
    Path((kind, id, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<SectionSyncBody>,
) -> Result<Json<SyncOutcome>, AppError> {
    do_sync_sections(&state, doc_ref(scope_from(&kind, id)?, &slot)?, &headers, body).await
}

// --- task scope wrappers ---

pub async fn get_task_sections(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
) -> Result<Json<SectionsResponse>, AppError> {
    do_get_sections(&state, task_doc_ref(pid, tid, &slot)?).await
}

pub async fn get_task_section(
    State(state): State<ServerState>,
    Path((pid, tid, slot, sid)): Path<(String, String, String, String)>,
    Query(query): Query<SectionQuery>,
) -> Result<Json<SectionContent>, AppError> {
    do_get_section(&state, task_doc_ref(pid, tid, &slot)?, &sid, query.include_children).await
}

pub async fn update_task_section(
    State(state): State<ServerState>,
    Path((pid, tid, slot, sid)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<SectionUpdateBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_update_section(&state, task_doc_ref(pid, tid, &slot)?, &sid, &headers, body).await
}

pub async fn insert_task_section(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<SectionInsertBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_insert_section(&state, task_doc_ref(pid, tid, &slot)?, &headers, body).await
}

pub async fn delete_task_section(
    State(state): State<ServerState>,
    Path((pid, tid, slot, sid)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Query(query): Query<SectionDeleteQuery>,
) -> Result<Json<AppendOutcome>, AppError> {
    do_delete_section(&state, task_doc_ref(pid, tid, &slot)?, &sid, &headers, query).await
}

pub async fn sync_task_sections(
    State(state): State<ServerState>,
    Path((pid, tid, slot)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<SectionSyncBody>,
) -> Result<Json<SyncOutcome>, AppError> {
    do_sync_sections(&state, task_doc_ref(pid, tid, &slot)?, &headers, body).await
}

// ============================================================================
// Execution plan
// ============================================================================

#[derive(Serialize)]
pub struct PlanResponse {
    pub plan_id: String,
    pub task_id: String,
    pub status: String,
    pub dependencies: Vec<crate::plan::DependencyEdge>,
    pub steps: Vec<crate::plan::PlanStep>,
    pub version: u64,
    pub content: String,
}

fn plan_response(plan: &PlanDocument, version: u64) -> PlanResponse {
    PlanResponse {
        plan_id: plan.front.plan_id.clone(),
        task_id: plan.front.task_id.clone(),
        status: plan.front.status.clone(),
        dependencies: plan.front.dependencies.clone(),
        steps: plan.steps.clone(),
        version,
        content: crate::plan::parser::emit(plan),
    }
}

pub async fn get_execution_plan(
    State(state): State<ServerState>,
    Path((pid, tid)): Path<(String, String)>,
) -> Result<Json<PlanResponse>, AppError> {
    let (plan, version) = state.plans.load(&pid, &tid).await?;
    Ok(Json(plan_response(&plan, version)))
}

#[derive(Debug, Deserialize)]
pub struct PlanSaveBody {
    /// Full plan document (front-matter + step list)
    pub content: String,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

pub async fn save_execution_plan(
    State(state): State<ServerState>,
    Path((pid, tid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<PlanSaveBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    let mut plan = crate::plan::parser::parse(&body.content)?;
    let user = recording_user(&state, &headers);
    let outcome = state
        .plans
        .save(
            &pid,
            &tid,
            &mut plan,
            body.expected_version,
            &user,
            ChunkSource::Api,
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct NextStepResponse {
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<crate::plan::PlanStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EmptyReason>,
}

pub async fn get_next_step(
    State(state): State<ServerState>,
    Path((pid, tid)): Path<(String, String)>,
) -> Result<Json<NextStepResponse>, AppError> {
    let next = state.plans.next_step_for(&pid, &tid).await?;
    Ok(Json(match next {
        NextStep::Ready(step) => NextStepResponse {
            empty: false,
            step: Some(step),
            reason: None,
        },
        NextStep::Empty(reason) => NextStepResponse {
            empty: true,
            step: None,
            reason: Some(reason),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct StepStatusBody {
    pub status: String,
    #[serde(default)]
    pub output: Option<String>,
}

pub async fn update_step_status(
    State(state): State<ServerState>,
    Path((pid, tid, sid)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<StepStatusBody>,
) -> Result<Json<crate::plan::PlanStep>, AppError> {
    let status = StepStatus::parse(&body.status)
        .ok_or_else(|| AppError::bad_request(format!("unknown status: {}", body.status)))?;
    let user = recording_user(&state, &headers);
    let step = state
        .plans
        .update_step(
            &pid,
            &tid,
            &sid,
            status,
            body.output.as_deref(),
            &user,
            ChunkSource::Api,
        )
        .await?;
    Ok(Json(step))
}

// ============================================================================
// Audio
// ============================================================================

#[derive(Serialize)]
pub struct TranscribeResponse {
    pub transcript: crate::audio::TranscriptionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<AppendOutcome>,
}

/// Multipart upload: a `file` part plus optional `model`, `language`,
/// `prompt`, `temperature` text parts.
pub async fn transcribe_meeting(
    State(state): State<ServerState>,
    Path(mid): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, AppError> {
    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut options = TranscriptionOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("bad multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("bad file part: {}", e)))?;
                audio_bytes = Some(bytes.to_vec());
            }
            "model" => options.model = read_text_field(field).await?,
            "language" => options.language = Some(read_text_field(field).await?),
            "prompt" => options.prompt = Some(read_text_field(field).await?),
            "temperature" => {
                let raw = read_text_field(field).await?;
                options.temperature = raw
                    .parse()
                    .map_err(|_| AppError::bad_request(format!("bad temperature: {}", raw)))?;
            }
            _ => {}
        }
    }

    let audio_bytes =
        audio_bytes.ok_or_else(|| AppError::bad_request("missing file part".to_string()))?;

    // Stage the upload; the file is owned by this request and removed
    // when the attempt finishes.
    let staged = std::env::temp_dir().join(format!("governor-upload-{}.wav", Uuid::new_v4()));
    tokio::fs::write(&staged, &audio_bytes)
        .await
        .map_err(CoreError::from)?;

    let user = recording_user(&state, &headers);
    let result = state
        .audio
        .transcribe_meeting(
            &state.store,
            &mid,
            &CancellationToken::new(),
            &staged,
            &options,
            &user,
            ChunkSource::Api,
        )
        .await;

    let _ = tokio::fs::remove_file(&staged).await;
    let (transcript, document) = result?;

    Ok(Json(TranscribeResponse {
        transcript,
        document,
    }))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::bad_request(format!("bad text part: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct TextUploadBody {
    pub text: String,
}

/// Non-audio meeting upload: recorded as a direct append to the
/// meeting's `polish` slot by the uploader.
pub async fn text_upload(
    State(state): State<ServerState>,
    Path(mid): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TextUploadBody>,
) -> Result<Json<AppendOutcome>, AppError> {
    let doc = doc_ref(
        DocumentScope::Meeting { meeting_id: mid },
        Slot::Polish.as_str(),
    )?;
    let user = recording_user(&state, &headers);
    let mut content = body.text;
    if !content.ends_with('\n') {
        content.push('\n');
    }
    Ok(Json(
        state
            .store
            .append(&doc, AppendRequest::append(content, user, ChunkSource::Api))
            .await?,
    ))
}

pub async fn audio_health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.audio.health().await)
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    BadRequest(String),
}

impl AppError {
    fn bad_request(message: String) -> Self {
        AppError::BadRequest(message)
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidScope(_)
        | CoreError::InvalidSlot { .. }
        | CoreError::MissingArgument(_)
        | CoreError::PlanParse(_)
        | CoreError::InvalidStepTransition { .. }
        | CoreError::DependencyCycle(_)
        | CoreError::SectionHasChildren(_)
        | CoreError::PathTraversal(_) => StatusCode::BAD_REQUEST,
        CoreError::DocNotFound(_)
        | CoreError::SectionNotFound(_)
        | CoreError::TemplateNotFound(_)
        | CoreError::StepNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::VersionMismatch { .. } => StatusCode::CONFLICT,
        CoreError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        CoreError::TranscriberUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Io(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, mut body) = match &self {
            AppError::Core(err) => (
                status_for(err),
                serde_json::json!({
                    "error": err.to_string(),
                    "code": err.code(),
                }),
            ),
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": message,
                    "code": "invalid_input",
                }),
            ),
        };
        if let AppError::Core(CoreError::VersionMismatch { expected, actual }) = &self {
            body["details"] = serde_json::json!({
                "expected": expected,
                "actual": actual,
            });
        }

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Core(err)
    }
}
