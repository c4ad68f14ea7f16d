//! Prompt template registry.
//!
//! Templates resolve in layers: the static built-in set shipped with the
//! product, then dynamic JSON templates from global, user and project
//! directories, with first-wins name de-duplication. Parsed sets are
//! cached behind a TTL + directory-mtime + trigger-file policy.

pub mod models;
pub mod parser;
pub mod registry;

pub use models::{
    FilledPrompt, PromptMessage, PromptTemplate, TemplateArgument, TemplateMetadata, TemplateScope,
};
pub use registry::PromptRegistry;

/// Sentinel file whose presence (anywhere under the data root) forces a
/// registry reload on next access.
pub const TRIGGER_FILE: &str = ".prompts_changed";
