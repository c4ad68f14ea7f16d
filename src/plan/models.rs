//! Plan document models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl StepStatus {
    /// Checklist symbol used in the plan body.
    pub fn symbol(&self) -> char {
        match self {
            StepStatus::Pending => ' ',
            StepStatus::InProgress => '>',
            StepStatus::Succeeded => 'x',
            StepStatus::Failed => '!',
            StepStatus::Cancelled => '~',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<StepStatus> {
        match symbol {
            ' ' => Some(StepStatus::Pending),
            '>' => Some(StepStatus::InProgress),
            'x' => Some(StepStatus::Succeeded),
            '!' => Some(StepStatus::Failed),
            '~' => Some(StepStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Cancelled
        )
    }

    /// Permitted transitions: `pending → in-progress → terminal`; from a
    /// terminal status only an explicit reset to `pending`.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        match (self, next) {
            (StepStatus::Pending, StepStatus::InProgress) => true,
            (StepStatus::InProgress, s) if s.is_terminal() => true,
            (s, StepStatus::Pending) if s.is_terminal() => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<StepStatus> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "in-progress" => Some(StepStatus::InProgress),
            "succeeded" => Some(StepStatus::Succeeded),
            "failed" => Some(StepStatus::Failed),
            "cancelled" => Some(StepStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step priority; steps without an explicit priority schedule as medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPriority {
    High,
    Medium,
    Low,
}

impl StepPriority {
    /// Scheduling rank; lower runs first.
    pub fn rank(&self) -> u8 {
        match self {
            StepPriority::High => 0,
            StepPriority::Medium => 1,
            StepPriority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepPriority::High => "high",
            StepPriority::Medium => "medium",
            StepPriority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<StepPriority> {
        match s {
            "high" => Some(StepPriority::High),
            "medium" => Some(StepPriority::Medium),
            "low" => Some(StepPriority::Low),
            _ => None,
        }
    }
}

/// One step in the plan body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// `step-NN`, contiguous from `step-01`.
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    pub priority: Option<StepPriority>,
}

impl PlanStep {
    /// Numeric part of the step id, for tie-breaking.
    pub fn number(&self) -> u32 {
        self.id
            .strip_prefix("step-")
            .and_then(|n| n.parse().ok())
            .unwrap_or(u32::MAX)
    }

    pub fn scheduling_priority(&self) -> StepPriority {
        self.priority.unwrap_or(StepPriority::Medium)
    }
}

/// Make a contiguous step id: `step-01`, `step-02`, …
pub fn step_id(number: usize) -> String {
    format!("step-{:02}", number)
}

/// A dependency edge: `target` may not start until `source` succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
}

/// YAML front-matter of the plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFrontMatter {
    pub plan_id: String,
    pub task_id: String,
    /// Lifecycle label (e.g. `Draft`); a terminal value retires the plan.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
}

/// Parsed view of a task's execution plan.
#[derive(Debug, Clone)]
pub struct PlanDocument {
    pub front: PlanFrontMatter,
    pub steps: Vec<PlanStep>,
}

impl PlanDocument {
    /// Fresh draft plan with no steps.
    pub fn new(plan_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            front: PlanFrontMatter {
                plan_id: plan_id.into(),
                task_id: task_id.into(),
                status: "Draft".to_string(),
                created_at: now,
                updated_at: now,
                dependencies: Vec::new(),
            },
            steps: Vec::new(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Direct prerequisites of a step.
    pub fn dependencies_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> {
        self.front
            .dependencies
            .iter()
            .filter(move |e| e.target == id)
            .map(|e| e.source.as_str())
    }
}

/// Why `next_step` returned no step. The reasons are mutually exclusive
/// and exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    AllComplete,
    BlockedByFailure,
    BlockedByInProgress,
}

/// Outcome of the next-step computation.
#[derive(Debug, Clone)]
pub enum NextStep {
    Ready(PlanStep),
    Empty(EmptyReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_symbols_round_trip() {
        for status in [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Succeeded,
            StepStatus::Failed,
            StepStatus::Cancelled,
        ] {
            assert_eq!(StepStatus::from_symbol(status.symbol()), Some(status));
        }
        assert_eq!(StepStatus::from_symbol('?'), None);
    }

    #[test]
    fn test_transition_rules() {
        use StepStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Succeeded));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Cancelled));
        // explicit reset from any terminal status
        assert!(Succeeded.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(Cancelled.can_transition_to(Pending));
        // everything else is rejected
        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Pending.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_priority_ranks() {
        assert!(StepPriority::High.rank() < StepPriority::Medium.rank());
        assert!(StepPriority::Medium.rank() < StepPriority::Low.rank());
    }

    #[test]
    fn test_step_number() {
        let step = PlanStep {
            id: "step-07".into(),
            description: "x".into(),
            status: StepStatus::Pending,
            priority: None,
        };
        assert_eq!(step.number(), 7);
        assert_eq!(step.scheduling_priority(), StepPriority::Medium);
    }

    #[test]
    fn test_step_id_formatting() {
        assert_eq!(step_id(1), "step-01");
        assert_eq!(step_id(12), "step-12");
        assert_eq!(step_id(104), "step-104");
    }

    #[test]
    fn test_dependencies_of() {
        let mut plan = PlanDocument::new("pl", "t");
        plan.front.dependencies = vec![
            DependencyEdge {
                source: "step-01".into(),
                target: "step-03".into(),
            },
            DependencyEdge {
                source: "step-02".into(),
                target: "step-03".into(),
            },
        ];
        let deps: Vec<_> = plan.dependencies_of("step-03").collect();
        assert_eq!(deps, vec!["step-01", "step-02"]);
        assert_eq!(plan.dependencies_of("step-01").count(), 0);
    }
}
