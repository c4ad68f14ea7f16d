//! Execution-plan engine.
//!
//! A plan lives in a task's `execution_plan` slot as Markdown: YAML
//! front-matter carrying identity and dependency edges, followed by a
//! checklist of steps. The engine parses and emits that document,
//! computes the next executable step under dependency+priority rules, and
//! applies status updates through the document store's optimistic lock.

pub mod engine;
pub mod models;
pub mod parser;

pub use engine::PlanEngine;
pub use models::{
    DependencyEdge, EmptyReason, NextStep, PlanDocument, PlanFrontMatter, PlanStep, StepPriority,
    StepStatus,
};
