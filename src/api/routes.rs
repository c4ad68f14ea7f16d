//! API route definitions

use super::handlers::{self, ServerState};
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: ServerState) -> Router {
    let cors = match state.config.cors.allowed_origins.as_slice() {
        [] => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        origins => {
            let origins: Vec<axum::http::HeaderValue> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Documents (project and meeting scope: {kind} ∈ projects|meetings)
        // ====================================================================
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/export",
            get(handlers::export_doc),
        )
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/append",
            post(handlers::append_doc),
        )
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/chunks",
            get(handlers::list_doc_chunks),
        )
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/squash",
            post(handlers::squash_doc),
        )
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/sections",
            get(handlers::get_sections).post(handlers::insert_section),
        )
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/sections/sync",
            post(handlers::sync_sections),
        )
        .route(
            "/api/v1/{kind}/{id}/docs/{slot}/sections/{sid}",
            get(handlers::get_section)
                .put(handlers::update_section)
                .delete(handlers::delete_section),
        )
        // ====================================================================
        // Documents (task scope)
        // ====================================================================
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/export",
            get(handlers::export_task_doc),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/append",
            post(handlers::append_task_doc),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/chunks",
            get(handlers::list_task_doc_chunks),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/squash",
            post(handlers::squash_task_doc),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/sections",
            get(handlers::get_task_sections).post(handlers::insert_task_section),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/sections/sync",
            post(handlers::sync_task_sections),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/docs/{slot}/sections/{sid}",
            get(handlers::get_task_section)
                .put(handlers::update_task_section)
                .delete(handlers::delete_task_section),
        )
        // ====================================================================
        // Execution plan
        // ====================================================================
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/execution-plan",
            get(handlers::get_execution_plan).post(handlers::save_execution_plan),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/execution-plan/next-step",
            get(handlers::get_next_step),
        )
        .route(
            "/api/v1/projects/{pid}/tasks/{tid}/execution-plan/steps/{sid}/status",
            post(handlers::update_step_status),
        )
        // ====================================================================
        // Audio
        // ====================================================================
        .route(
            "/api/v1/meetings/{mid}/audio/transcribe",
            post(handlers::transcribe_meeting),
        )
        .route(
            "/api/v1/meetings/{mid}/text-upload",
            post(handlers::text_upload),
        )
        .route("/api/v1/audio/health", get(handlers::audio_health))
        // Middleware (ServiceBuilder order: first layer is outermost)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
