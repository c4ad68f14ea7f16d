//! Plan document parsing and deterministic emission.
//!
//! Format: YAML front-matter between `---` fences, then one checklist
//! bullet per step:
//!
//! ```text
//! ---
//! plan_id: pl-42
//! task_id: t-7
//! status: Draft
//! created_at: 2026-03-01T10:00:00Z
//! updated_at: 2026-03-01T10:05:00Z
//! dependencies:
//!   - {source: "step-01", target: "step-02"}
//! ---
//!
//! - [ ] step-01: scaffold the module priority:high
//! - [x] step-02: wire it up
//! ```

use super::models::*;
use crate::error::{CoreError, CoreResult};
use chrono::SecondsFormat;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn step_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^- \[(.)\] (step-\d+): (.*?)(?: priority:(high|medium|low))?$")
            .expect("step line regex")
    })
}

/// Parse a plan document.
///
/// Validates that step ids are contiguous `step-01…step-NN` and that
/// every dependency edge references existing ids.
pub fn parse(content: &str) -> CoreResult<PlanDocument> {
    let (front_raw, body) = split_front_matter(content)?;
    let front: PlanFrontMatter = serde_yaml::from_str(front_raw)
        .map_err(|e| CoreError::PlanParse(format!("front-matter: {}", e)))?;

    let mut steps = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        let captures = match step_line_re().captures(trimmed) {
            Some(c) => c,
            None => {
                return Err(CoreError::PlanParse(format!(
                    "unrecognised plan line: {:?}",
                    trimmed
                )))
            }
        };
        let symbol = captures[1].chars().next().unwrap_or(' ');
        let status = StepStatus::from_symbol(symbol)
            .ok_or_else(|| CoreError::PlanParse(format!("unknown status symbol {:?}", symbol)))?;
        let priority = captures.get(4).map(|m| {
            StepPriority::parse(m.as_str()).expect("regex restricts priority values")
        });
        steps.push(PlanStep {
            id: captures[2].to_string(),
            description: captures[3].to_string(),
            status,
            priority,
        });
    }

    validate(&front, &steps)?;
    Ok(PlanDocument { front, steps })
}

fn split_front_matter(content: &str) -> CoreResult<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .ok_or_else(|| CoreError::PlanParse("missing front-matter fence".into()))?;
    let end = rest
        .find("\n---\n")
        .ok_or_else(|| CoreError::PlanParse("unterminated front-matter".into()))?;
    Ok((&rest[..end], &rest[end + 5..]))
}

fn validate(front: &PlanFrontMatter, steps: &[PlanStep]) -> CoreResult<()> {
    let mut seen = HashSet::new();
    for (i, step) in steps.iter().enumerate() {
        let expected = step_id(i + 1);
        if step.id != expected {
            return Err(CoreError::PlanParse(format!(
                "step ids must be contiguous: found {:?}, expected {:?}",
                step.id, expected
            )));
        }
        seen.insert(step.id.as_str());
    }
    for edge in &front.dependencies {
        if !seen.contains(edge.source.as_str()) || !seen.contains(edge.target.as_str()) {
            return Err(CoreError::PlanParse(format!(
                "dependency references unknown step: {} -> {}",
                edge.source, edge.target
            )));
        }
    }
    Ok(())
}

/// Emit the plan deterministically: fixed front-matter field order,
/// RFC-3339 UTC timestamps, inline dependency objects, `dependencies: []`
/// when empty.
pub fn emit(plan: &PlanDocument) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("plan_id: {}\n", plan.front.plan_id));
    out.push_str(&format!("task_id: {}\n", plan.front.task_id));
    out.push_str(&format!("status: {}\n", plan.front.status));
    out.push_str(&format!(
        "created_at: {}\n",
        plan.front
            .created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!(
        "updated_at: {}\n",
        plan.front
            .updated_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    if plan.front.dependencies.is_empty() {
        out.push_str("dependencies: []\n");
    } else {
        out.push_str("dependencies:\n");
        for edge in &plan.front.dependencies {
            out.push_str(&format!(
                "  - {{source: \"{}\", target: \"{}\"}}\n",
                edge.source, edge.target
            ));
        }
    }
    out.push_str("---\n\n");

    for step in &plan.steps {
        out.push_str(&format!(
            "- [{}] {}: {}",
            step.status.symbol(),
            step.id,
            step.description
        ));
        if let Some(priority) = step.priority {
            out.push_str(&format!(" priority:{}", priority.as_str()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> PlanDocument {
        let mut plan = PlanDocument::new("pl", "t");
        plan.front.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        plan.front.updated_at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap();
        plan.front.dependencies = vec![DependencyEdge {
            source: "step-01".into(),
            target: "step-02".into(),
        }];
        plan.steps = vec![
            PlanStep {
                id: "step-01".into(),
                description: "scaffold the module".into(),
                status: StepStatus::Pending,
                priority: Some(StepPriority::High),
            },
            PlanStep {
                id: "step-02".into(),
                description: "wire it up".into(),
                status: StepStatus::Succeeded,
                priority: None,
            },
        ];
        plan
    }

    #[test]
    fn test_emit_is_deterministic() {
        let plan = sample();
        let a = emit(&plan);
        let b = emit(&plan);
        assert_eq!(a, b);
        assert!(a.starts_with("---\nplan_id: pl\ntask_id: t\nstatus: Draft\n"));
        assert!(a.contains("dependencies:\n  - {source: \"step-01\", target: \"step-02\"}\n"));
        assert!(a.contains("- [ ] step-01: scaffold the module priority:high\n"));
        assert!(a.contains("- [x] step-02: wire it up\n"));
    }

    #[test]
    fn test_parse_emit_round_trip() {
        let plan = sample();
        let text = emit(&plan);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.front.plan_id, "pl");
        assert_eq!(parsed.front.dependencies, plan.front.dependencies);
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[0].priority, Some(StepPriority::High));
        assert_eq!(parsed.steps[0].status, StepStatus::Pending);
        assert_eq!(parsed.steps[1].status, StepStatus::Succeeded);
        assert_eq!(parsed.steps[1].priority, None);
        // a second emit reproduces the exact bytes
        assert_eq!(emit(&parsed), text);
    }

    #[test]
    fn test_emit_empty_dependencies_inline() {
        let plan = PlanDocument::new("pl", "t");
        assert!(emit(&plan).contains("dependencies: []\n"));
    }

    #[test]
    fn test_parse_all_status_symbols() {
        let text = "---\nplan_id: pl\ntask_id: t\nstatus: Draft\ncreated_at: 2026-03-01T10:00:00Z\nupdated_at: 2026-03-01T10:00:00Z\ndependencies: []\n---\n\n- [ ] step-01: a\n- [>] step-02: b\n- [x] step-03: c\n- [!] step-04: d\n- [~] step-05: e\n";
        let plan = parse(text).unwrap();
        let statuses: Vec<_> = plan.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Pending,
                StepStatus::InProgress,
                StepStatus::Succeeded,
                StepStatus::Failed,
                StepStatus::Cancelled
            ]
        );
    }

    #[test]
    fn test_parse_rejects_gapped_ids() {
        let text = "---\nplan_id: pl\ntask_id: t\nstatus: Draft\ncreated_at: 2026-03-01T10:00:00Z\nupdated_at: 2026-03-01T10:00:00Z\ndependencies: []\n---\n\n- [ ] step-01: a\n- [ ] step-03: b\n";
        assert!(matches!(parse(text), Err(CoreError::PlanParse(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_dependency() {
        let text = "---\nplan_id: pl\ntask_id: t\nstatus: Draft\ncreated_at: 2026-03-01T10:00:00Z\nupdated_at: 2026-03-01T10:00:00Z\ndependencies:\n  - {source: \"step-09\", target: \"step-01\"}\n---\n\n- [ ] step-01: a\n";
        assert!(matches!(parse(text), Err(CoreError::PlanParse(_))));
    }

    #[test]
    fn test_parse_rejects_missing_front_matter() {
        assert!(matches!(
            parse("- [ ] step-01: a\n"),
            Err(CoreError::PlanParse(_))
        ));
    }

    #[test]
    fn test_description_containing_priority_word() {
        // "priority:" text mid-description is not a priority suffix
        let text = "---\nplan_id: pl\ntask_id: t\nstatus: Draft\ncreated_at: 2026-03-01T10:00:00Z\nupdated_at: 2026-03-01T10:00:00Z\ndependencies: []\n---\n\n- [ ] step-01: review priority:high handling in parser\n";
        let plan = parse(text).unwrap();
        assert_eq!(plan.steps[0].priority, None);
        assert_eq!(
            plan.steps[0].description,
            "review priority:high handling in parser"
        );
    }
}
