//! Document store models: scopes, slots, chunk records, and meta.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How many accepted-chunk hashes are retained for duplicate detection.
pub const HASH_WINDOW_SIZE: usize = 16;

/// Scope of a governed document. Determines the path layout and the set
/// of allowed slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DocumentScope {
    Project { project_id: String },
    Task { project_id: String, task_id: String },
    Meeting { meeting_id: String },
}

impl DocumentScope {
    /// Scope name as it appears on the wire and in errors.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentScope::Project { .. } => "project",
            DocumentScope::Task { .. } => "task",
            DocumentScope::Meeting { .. } => "meeting",
        }
    }

    /// Slots permitted in this scope.
    pub fn allowed_slots(&self) -> &'static [Slot] {
        match self {
            DocumentScope::Project { .. } => &[Slot::FeatureList, Slot::ArchitectureDesign],
            DocumentScope::Task { .. } => &[
                Slot::Requirements,
                Slot::Design,
                Slot::Test,
                Slot::ExecutionPlan,
            ],
            DocumentScope::Meeting { .. } => &[Slot::Polish, Slot::Summary, Slot::Topic],
        }
    }

    /// Directory holding this scope's documents, relative to the
    /// configured projects/meetings roots.
    pub fn dir(&self, projects_root: &Path, meetings_root: &Path) -> PathBuf {
        match self {
            DocumentScope::Project { project_id } => projects_root.join(project_id),
            DocumentScope::Task {
                project_id,
                task_id,
            } => projects_root.join(project_id).join("tasks").join(task_id),
            DocumentScope::Meeting { meeting_id } => meetings_root.join(meeting_id),
        }
    }
}

impl fmt::Display for DocumentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentScope::Project { project_id } => write!(f, "project/{}", project_id),
            DocumentScope::Task {
                project_id,
                task_id,
            } => write!(f, "project/{}/task/{}", project_id, task_id),
            DocumentScope::Meeting { meeting_id } => write!(f, "meeting/{}", meeting_id),
        }
    }
}

/// Well-known document kind within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    // project scope
    FeatureList,
    ArchitectureDesign,
    // meeting scope
    Polish,
    Summary,
    Topic,
    // task scope
    Requirements,
    Design,
    Test,
    ExecutionPlan,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::FeatureList => "feature_list",
            Slot::ArchitectureDesign => "architecture_design",
            Slot::Polish => "polish",
            Slot::Summary => "summary",
            Slot::Topic => "topic",
            Slot::Requirements => "requirements",
            Slot::Design => "design",
            Slot::Test => "test",
            Slot::ExecutionPlan => "execution_plan",
        }
    }

    pub fn parse(s: &str) -> Option<Slot> {
        match s {
            "feature_list" => Some(Slot::FeatureList),
            "architecture_design" => Some(Slot::ArchitectureDesign),
            "polish" => Some(Slot::Polish),
            "summary" => Some(Slot::Summary),
            "topic" => Some(Slot::Topic),
            "requirements" => Some(Slot::Requirements),
            "design" => Some(Slot::Design),
            "test" => Some(Slot::Test),
            "execution_plan" => Some(Slot::ExecutionPlan),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-resolved document reference: scope + slot, validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub scope: DocumentScope,
    pub slot: Slot,
}

impl DocRef {
    /// Build a reference, rejecting slot/scope combinations that are not
    /// in the allowed table.
    pub fn new(scope: DocumentScope, slot: Slot) -> CoreResult<Self> {
        if !scope.allowed_slots().contains(&slot) {
            return Err(CoreError::InvalidSlot {
                scope: scope.name().to_string(),
                slot: slot.as_str().to_string(),
            });
        }
        Ok(Self { scope, slot })
    }

    /// Slot directory under the scope directory.
    pub fn slot_dir(&self, projects_root: &Path, meetings_root: &Path) -> PathBuf {
        self.scope
            .dir(projects_root, meetings_root)
            .join("docs")
            .join(self.slot.as_str())
    }

    /// Pre-chunk-log layout: `{scope_dir}/{slot}.md`, recognised read-only.
    pub fn legacy_path(&self, projects_root: &Path, meetings_root: &Path) -> PathBuf {
        self.scope
            .dir(projects_root, meetings_root)
            .join(format!("{}.md", self.slot.as_str()))
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.slot)
    }
}

/// Chunk operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOp {
    Append,
    Replace,
    Squash,
}

/// Where a write originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSource {
    Ui,
    Mcp,
    Api,
    Migration,
    Cli,
}

/// One record in a document's append-only JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Strictly monotonic from 1; exactly one record per sequence.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub op: ChunkOp,
    pub content: String,
    pub user: String,
    pub source: ChunkSource,
    /// `stable_hash(content)`
    pub hash: String,
    /// `false` marks a record superseded by a squash, retained for audit.
    pub active: bool,
}

/// Per-document metadata; its rename is the commit point for a write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    /// Equals `last_sequence`.
    pub version: u64,
    pub last_sequence: u64,
    /// Hash of the compiled view.
    pub etag: String,
    /// Newest-first hashes of the last accepted chunks, for duplicate
    /// detection.
    pub hash_window: Vec<String>,
    /// Total records in the log, active or not.
    pub chunk_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocMeta {
    /// Meta for a document that has never been written.
    pub fn empty(now: DateTime<Utc>, empty_etag: String) -> Self {
        Self {
            version: 0,
            last_sequence: 0,
            etag: empty_etag,
            hash_window: Vec::new(),
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an accepted chunk hash, newest first, truncated to the
    /// configured window.
    pub fn push_hash(&mut self, hash: String) {
        self.hash_window.insert(0, hash);
        self.hash_window.truncate(HASH_WINDOW_SIZE);
    }
}

/// Parameters of an `append` call.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub content: String,
    pub user: String,
    pub source: ChunkSource,
    pub op: ChunkOp,
    /// Optional optimistic lock against the current version.
    pub expected_version: Option<u64>,
}

impl AppendRequest {
    pub fn append(content: impl Into<String>, user: impl Into<String>, source: ChunkSource) -> Self {
        Self {
            content: content.into(),
            user: user.into(),
            source,
            op: ChunkOp::Append,
            expected_version: None,
        }
    }

    pub fn replace(
        content: impl Into<String>,
        user: impl Into<String>,
        source: ChunkSource,
    ) -> Self {
        Self {
            content: content.into(),
            user: user.into(),
            source,
            op: ChunkOp::Replace,
            expected_version: None,
        }
    }

    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Result of an `append` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub version: u64,
    pub etag: String,
    pub sequence: u64,
    /// `true` when the content matched a recent accepted chunk and the
    /// call was a no-op.
    pub duplicate: bool,
    pub timestamp: DateTime<Utc>,
}

/// Result of an `export` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub content: String,
    pub version: u64,
    pub etag: String,
    pub updated_at: DateTime<Utc>,
    /// `false` when the slot has never been written.
    pub exists: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_slots_per_scope() {
        let project = DocumentScope::Project {
            project_id: "p1".into(),
        };
        assert!(DocRef::new(project.clone(), Slot::FeatureList).is_ok());
        assert!(DocRef::new(project.clone(), Slot::ArchitectureDesign).is_ok());
        assert!(matches!(
            DocRef::new(project, Slot::Summary),
            Err(CoreError::InvalidSlot { .. })
        ));

        let task = DocumentScope::Task {
            project_id: "p1".into(),
            task_id: "t1".into(),
        };
        assert!(DocRef::new(task.clone(), Slot::ExecutionPlan).is_ok());
        assert!(DocRef::new(task, Slot::Polish).is_err());

        let meeting = DocumentScope::Meeting {
            meeting_id: "m1".into(),
        };
        assert!(DocRef::new(meeting.clone(), Slot::Polish).is_ok());
        assert!(DocRef::new(meeting, Slot::Design).is_err());
    }

    #[test]
    fn test_scope_dir_layout() {
        let projects = Path::new("/data/projects");
        let meetings = Path::new("/data/meetings");

        let doc = DocRef::new(
            DocumentScope::Task {
                project_id: "p1".into(),
                task_id: "t9".into(),
            },
            Slot::Design,
        )
        .unwrap();
        assert_eq!(
            doc.slot_dir(projects, meetings),
            PathBuf::from("/data/projects/p1/tasks/t9/docs/design")
        );

        let doc = DocRef::new(
            DocumentScope::Meeting {
                meeting_id: "m7".into(),
            },
            Slot::Summary,
        )
        .unwrap();
        assert_eq!(
            doc.slot_dir(projects, meetings),
            PathBuf::from("/data/meetings/m7/docs/summary")
        );
        assert_eq!(
            doc.legacy_path(projects, meetings),
            PathBuf::from("/data/meetings/m7/summary.md")
        );
    }

    #[test]
    fn test_slot_round_trip() {
        for slot in [
            Slot::FeatureList,
            Slot::ArchitectureDesign,
            Slot::Polish,
            Slot::Summary,
            Slot::Topic,
            Slot::Requirements,
            Slot::Design,
            Slot::Test,
            Slot::ExecutionPlan,
        ] {
            assert_eq!(Slot::parse(slot.as_str()), Some(slot));
        }
        assert_eq!(Slot::parse("nope"), None);
    }

    #[test]
    fn test_hash_window_truncates() {
        let mut meta = DocMeta::empty(Utc::now(), "e".into());
        for i in 0..20 {
            meta.push_hash(format!("h{}", i));
        }
        assert_eq!(meta.hash_window.len(), HASH_WINDOW_SIZE);
        assert_eq!(meta.hash_window[0], "h19");
        assert_eq!(meta.hash_window.last().unwrap(), "h4");
    }

    #[test]
    fn test_chunk_record_serde() {
        let record = ChunkRecord {
            sequence: 1,
            timestamp: Utc::now(),
            op: ChunkOp::Append,
            content: "hello\n".into(),
            user: "alice".into(),
            source: ChunkSource::Api,
            hash: "abc".into(),
            active: true,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"op\":\"append\""));
        assert!(json.contains("\"source\":\"api\""));
        let back: ChunkRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 1);
        assert_eq!(back.content, "hello\n");
        assert!(back.active);
    }
}
