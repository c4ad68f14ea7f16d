//! Plan scheduling and state transitions over the document store.

use super::models::*;
use super::parser;
use crate::docs::{AppendRequest, ChunkSource, DocRef, DocStore, DocumentScope, Slot};
use crate::error::{CoreError, CoreResult};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Engine for a task's execution plan. All writes go through the store's
/// optimistic lock, so concurrent updates to the same plan surface as
/// `VersionMismatch`.
pub struct PlanEngine {
    store: Arc<DocStore>,
}

impl PlanEngine {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }

    fn plan_ref(project_id: &str, task_id: &str) -> CoreResult<DocRef> {
        DocRef::new(
            DocumentScope::Task {
                project_id: project_id.to_string(),
                task_id: task_id.to_string(),
            },
            Slot::ExecutionPlan,
        )
    }

    /// Load and parse the plan; returns the document plus the store
    /// version it was read at.
    pub async fn load(&self, project_id: &str, task_id: &str) -> CoreResult<(PlanDocument, u64)> {
        let doc = Self::plan_ref(project_id, task_id)?;
        let export = self.store.export(&doc).await?;
        if !export.exists {
            return Err(CoreError::DocNotFound(doc.to_string()));
        }
        let plan = parser::parse(&export.content)?;
        Ok((plan, export.version))
    }

    /// Validate, emit and persist the plan as a `replace` chunk.
    ///
    /// `updated_at` is refreshed on every save. Passing the version the
    /// plan was loaded at makes the write optimistic.
    pub async fn save(
        &self,
        project_id: &str,
        task_id: &str,
        plan: &mut PlanDocument,
        expected_version: Option<u64>,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<crate::docs::AppendOutcome> {
        detect_cycle(&plan.front.dependencies)?;
        plan.front.updated_at = Utc::now();
        let content = parser::emit(plan);

        let doc = Self::plan_ref(project_id, task_id)?;
        let mut req = AppendRequest::replace(content, user, source);
        if let Some(version) = expected_version {
            req = req.with_expected_version(version);
        }
        self.store.append(&doc, req).await
    }

    /// Highest-priority pending step whose dependencies all succeeded,
    /// ties broken by step number.
    pub fn next_step(plan: &PlanDocument) -> NextStep {
        let status_of: HashMap<&str, StepStatus> = plan
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.status))
            .collect();

        let ready = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| {
                plan.dependencies_of(&s.id)
                    .all(|dep| status_of.get(dep) == Some(&StepStatus::Succeeded))
            })
            .min_by_key(|s| (s.scheduling_priority().rank(), s.number()));

        if let Some(step) = ready {
            return NextStep::Ready(step.clone());
        }

        let pending: Vec<&PlanStep> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .collect();

        if pending.is_empty() {
            if plan
                .steps
                .iter()
                .any(|s| s.status == StepStatus::InProgress)
            {
                return NextStep::Empty(EmptyReason::BlockedByInProgress);
            }
            return NextStep::Empty(EmptyReason::AllComplete);
        }

        // Some step is still pending but nothing is runnable: the frontier
        // of every blocked chain has a direct dependency that is either a
        // failure-class terminal or in flight.
        let blocked_by_failure = pending.iter().any(|s| {
            plan.dependencies_of(&s.id).any(|dep| {
                matches!(
                    status_of.get(dep),
                    Some(StepStatus::Failed) | Some(StepStatus::Cancelled)
                )
            })
        });
        if blocked_by_failure {
            NextStep::Empty(EmptyReason::BlockedByFailure)
        } else {
            NextStep::Empty(EmptyReason::BlockedByInProgress)
        }
    }

    /// Load, compute and return the next executable step.
    pub async fn next_step_for(&self, project_id: &str, task_id: &str) -> CoreResult<NextStep> {
        let (plan, _) = self.load(project_id, task_id).await?;
        Ok(Self::next_step(&plan))
    }

    /// Apply a status transition to one step and persist.
    ///
    /// Output attached to a completion is recorded in the service log; its
    /// downstream persistence contract is the caller's concern.
    pub async fn update_step(
        &self,
        project_id: &str,
        task_id: &str,
        step_id: &str,
        status: StepStatus,
        output: Option<&str>,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<PlanStep> {
        let (mut plan, version) = self.load(project_id, task_id).await?;

        let step = plan
            .step_mut(step_id)
            .ok_or_else(|| CoreError::StepNotFound(step_id.to_string()))?;
        if !step.status.can_transition_to(status) {
            return Err(CoreError::InvalidStepTransition {
                from: step.status.to_string(),
                to: status.to_string(),
            });
        }
        step.status = status;
        let updated = step.clone();

        if let Some(output) = output {
            info!(step = %step_id, %status, output, "step output recorded");
        }

        self.save(project_id, task_id, &mut plan, Some(version), user, source)
            .await?;
        Ok(updated)
    }

    /// Insert a step (optionally after an existing one) and renumber.
    pub async fn insert_step(
        &self,
        project_id: &str,
        task_id: &str,
        description: &str,
        priority: Option<StepPriority>,
        after: Option<&str>,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<PlanStep> {
        let (mut plan, version) = self.load(project_id, task_id).await?;

        let position = match after {
            Some(after_id) => {
                plan.steps
                    .iter()
                    .position(|s| s.id == after_id)
                    .ok_or_else(|| CoreError::StepNotFound(after_id.to_string()))?
                    + 1
            }
            None => plan.steps.len(),
        };

        plan.steps.insert(
            position,
            PlanStep {
                id: String::new(), // assigned by renumber below
                description: description.to_string(),
                status: StepStatus::Pending,
                priority,
            },
        );
        renumber(&mut plan);
        let inserted = plan.steps[position].clone();

        self.save(project_id, task_id, &mut plan, Some(version), user, source)
            .await?;
        Ok(inserted)
    }

    /// Remove a step, dropping edges that reference it, and renumber.
    pub async fn remove_step(
        &self,
        project_id: &str,
        task_id: &str,
        step_id: &str,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<()> {
        let (mut plan, version) = self.load(project_id, task_id).await?;

        let position = plan
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| CoreError::StepNotFound(step_id.to_string()))?;
        plan.steps.remove(position);
        plan.front
            .dependencies
            .retain(|e| e.source != step_id && e.target != step_id);
        renumber(&mut plan);

        debug!(step = %step_id, "removed plan step");
        self.save(project_id, task_id, &mut plan, Some(version), user, source)
            .await?;
        Ok(())
    }
}

/// Renumber steps contiguously and rewrite dependency edges through the
/// old→new id map. Dependencies are an isomorphism under the map: the
/// edge set is unchanged up to renaming.
pub fn renumber(plan: &mut PlanDocument) {
    let mut mapping: HashMap<String, String> = HashMap::new();
    for (i, step) in plan.steps.iter_mut().enumerate() {
        let new_id = step_id(i + 1);
        if !step.id.is_empty() {
            mapping.insert(step.id.clone(), new_id.clone());
        }
        step.id = new_id;
    }
    for edge in plan.front.dependencies.iter_mut() {
        if let Some(new_source) = mapping.get(&edge.source) {
            edge.source = new_source.clone();
        }
        if let Some(new_target) = mapping.get(&edge.target) {
            edge.target = new_target.clone();
        }
    }
}

/// Reject dependency graphs with a cycle (DFS, three-colour).
pub fn detect_cycle(edges: &[DependencyEdge]) -> CoreResult<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), String> {
        if done.contains(node) {
            return Ok(());
        }
        if !visiting.insert(node) {
            return Err(node.to_string());
        }
        for next in adjacency.get(node).into_iter().flatten() {
            visit(next, adjacency, visiting, done)?;
        }
        visiting.remove(node);
        done.insert(node);
        Ok(())
    }

    for node in adjacency.keys() {
        visit(node, &adjacency, &mut visiting, &mut done)
            .map_err(CoreError::DependencyCycle)?;
    }
    Ok(())
}
