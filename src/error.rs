//! Core error kinds surfaced by the governance subsystems.
//!
//! Every operation that crosses a subsystem boundary returns
//! `Result<T, CoreError>` so the REST and MCP front-ends can map kinds to
//! wire codes without string matching. Infrastructure paths (startup,
//! background tasks) use `anyhow` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds surfaced by the core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("slot '{slot}' is not valid for scope '{scope}'")]
    InvalidSlot { scope: String, slot: String },

    #[error("document not found: {0}")]
    DocNotFound(String),

    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("section '{0}' has subsections; pass cascade=true to delete the subtree")]
    SectionHasChildren(String),

    #[error("version mismatch: expected {expected}, current {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Logged and skipped during template loading, never fatal to a batch.
    #[error("template path escapes its base directory: {0}")]
    PathTraversal(PathBuf),

    /// Internal to the transcriber chain walk; the orchestrator never
    /// surfaces it because the degraded tail always succeeds.
    #[error("transcriber unavailable: {0}")]
    TranscriberUnavailable(String),

    #[error("invalid step transition: {from} -> {to}")]
    InvalidStepTransition { from: String, to: String },

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("dependency cycle involving {0}")]
    DependencyCycle(String),

    #[error("plan document is malformed: {0}")]
    PlanParse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Stable machine-readable code for the wire error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidScope(_) => "invalid_scope",
            CoreError::InvalidSlot { .. } => "invalid_slot",
            CoreError::DocNotFound(_) => "doc_not_found",
            CoreError::SectionNotFound(_) => "section_not_found",
            CoreError::SectionHasChildren(_) => "section_has_children",
            CoreError::VersionMismatch { .. } => "version_mismatch",
            CoreError::MissingArgument(_) => "missing_argument",
            CoreError::TemplateNotFound(_) => "template_not_found",
            CoreError::PathTraversal(_) => "path_traversal",
            CoreError::TranscriberUnavailable(_) => "transcriber_unavailable",
            CoreError::InvalidStepTransition { .. } => "invalid_step_transition",
            CoreError::StepNotFound(_) => "step_not_found",
            CoreError::DependencyCycle(_) => "dependency_cycle",
            CoreError::PlanParse(_) => "plan_parse",
            CoreError::Cancelled => "cancelled",
            CoreError::Io(_) => "internal",
            CoreError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(anyhow::anyhow!("serialization error: {}", e))
    }
}

/// Convenience alias used throughout the core modules.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            CoreError::VersionMismatch {
                expected: 5,
                actual: 4
            }
            .code(),
            "version_mismatch"
        );
        assert_eq!(CoreError::DocNotFound("x".into()).code(), "doc_not_found");
        assert_eq!(CoreError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_display_includes_context() {
        let err = CoreError::InvalidSlot {
            scope: "project".into(),
            slot: "summary".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("summary"));
        assert!(msg.contains("project"));
    }
}
