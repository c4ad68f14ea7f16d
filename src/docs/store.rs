//! The versioned document store.
//!
//! Each slot directory holds `chunks.jsonl` (append-only log),
//! `compiled.md` (materialised view, regenerable), and `meta.json` whose
//! rename is the commit point. Writers are serialised per document path;
//! a partial write that died between the chunk append and the meta commit
//! is healed on the next write-side open by truncating the log back to
//! `meta.last_sequence`.

use super::hashing::stable_hash;
use super::locks::LockRegistry;
use super::models::*;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const CHUNKS_FILE: &str = "chunks.jsonl";
const COMPILED_FILE: &str = "compiled.md";
const META_FILE: &str = "meta.json";

/// Filesystem-backed document store. Cheap to share via `Arc`.
pub struct DocStore {
    projects_root: PathBuf,
    meetings_root: PathBuf,
    locks: LockRegistry,
}

impl DocStore {
    pub fn new(config: &Config) -> Self {
        Self::with_roots(config.projects_root(), config.meetings_root())
    }

    pub fn with_roots(projects_root: PathBuf, meetings_root: PathBuf) -> Self {
        Self {
            projects_root,
            meetings_root,
            locks: LockRegistry::new(),
        }
    }

    pub(crate) fn slot_dir(&self, doc: &DocRef) -> PathBuf {
        doc.slot_dir(&self.projects_root, &self.meetings_root)
    }

    fn legacy_path(&self, doc: &DocRef) -> PathBuf {
        doc.legacy_path(&self.projects_root, &self.meetings_root)
    }

    /// Append one chunk (or replace the document prefix) and commit.
    ///
    /// Fails with `VersionMismatch` when `expected_version` is stale.
    /// Content whose hash matches one of the last accepted chunks is a
    /// no-op returning `duplicate=true` and the unchanged meta.
    pub async fn append(&self, doc: &DocRef, req: AppendRequest) -> CoreResult<AppendOutcome> {
        let dir = self.slot_dir(doc);
        let lock = self.locks.for_path(&dir);
        let _guard = lock.write().await;

        let (mut meta, mut records) = self.open_for_write(doc, &dir).await?;

        if let Some(expected) = req.expected_version {
            if expected != meta.version {
                return Err(CoreError::VersionMismatch {
                    expected,
                    actual: meta.version,
                });
            }
        }

        // Appends dedupe against the recent-chunk window; a replace is
        // only a no-op when it would reproduce the current compiled view
        // (an older window entry may describe a state the document has
        // since left).
        let hash = stable_hash(&req.content);
        let duplicate = match req.op {
            ChunkOp::Append => meta.hash_window.iter().any(|h| h == &hash),
            ChunkOp::Replace | ChunkOp::Squash => meta.version > 0 && hash == meta.etag,
        };
        if duplicate {
            debug!(doc = %doc, "duplicate content, skipping write");
            return Ok(AppendOutcome {
                version: meta.version,
                etag: meta.etag.clone(),
                sequence: meta.last_sequence,
                duplicate: true,
                timestamp: meta.updated_at,
            });
        }

        let now = Utc::now();
        let record = ChunkRecord {
            sequence: meta.last_sequence + 1,
            timestamp: now,
            op: req.op,
            content: req.content,
            user: req.user,
            source: req.source,
            hash: hash.clone(),
            active: true,
        };

        tokio::fs::create_dir_all(&dir).await?;
        append_record(&dir.join(CHUNKS_FILE), &record).await?;
        records.push(record.clone());

        let compiled = compile(&records);
        meta.last_sequence = record.sequence;
        meta.version = record.sequence;
        meta.chunk_count += 1;
        meta.etag = stable_hash(&compiled);
        meta.push_hash(hash);
        meta.updated_at = now;

        // Commit point: readers observe the new version once this rename
        // lands.
        write_atomic(&dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?.as_slice()).await?;
        write_atomic(&dir.join(COMPILED_FILE), compiled.as_bytes()).await?;

        Ok(AppendOutcome {
            version: meta.version,
            etag: meta.etag,
            sequence: record.sequence,
            duplicate: false,
            timestamp: now,
        })
    }

    /// Read the compiled view. Returns an empty-but-valid result when the
    /// slot has never been written; a legacy `{slot}.md` file is served
    /// read-only until the first write migrates it.
    pub async fn export(&self, doc: &DocRef) -> CoreResult<ExportResult> {
        let dir = self.slot_dir(doc);
        let lock = self.locks.for_path(&dir);
        let _guard = lock.read().await;

        match read_meta(&dir).await? {
            Some(meta) => {
                let content = match tokio::fs::read_to_string(dir.join(COMPILED_FILE)).await {
                    Ok(c) => c,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(e) => return Err(e.into()),
                };
                Ok(ExportResult {
                    content,
                    version: meta.version,
                    etag: meta.etag,
                    updated_at: meta.updated_at,
                    exists: true,
                })
            }
            None => {
                let legacy = self.legacy_path(doc);
                match tokio::fs::read_to_string(&legacy).await {
                    Ok(content) => {
                        let etag = stable_hash(&content);
                        Ok(ExportResult {
                            content,
                            version: 0,
                            etag,
                            updated_at: Utc::now(),
                            exists: true,
                        })
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ExportResult {
                        content: String::new(),
                        version: 0,
                        etag: stable_hash(""),
                        updated_at: Utc::now(),
                        exists: false,
                    }),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// List all committed chunk records, including inactive ones retained
    /// for audit. Records beyond `meta.last_sequence` (uncommitted tail of
    /// a partial write) are not shown.
    pub async fn list_chunks(&self, doc: &DocRef) -> CoreResult<Vec<ChunkRecord>> {
        let dir = self.slot_dir(doc);
        let lock = self.locks.for_path(&dir);
        let _guard = lock.read().await;

        let meta = match read_meta(&dir).await? {
            Some(m) => m,
            None => return Ok(Vec::new()),
        };
        let records = read_records(&dir.join(CHUNKS_FILE)).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.sequence <= meta.last_sequence)
            .collect())
    }

    /// Collapse the log into one active chunk carrying the current
    /// compiled view; prior records are marked inactive but retained.
    ///
    /// Idempotent: squashing a document whose log already holds a single
    /// active chunk is a no-op.
    pub async fn squash(
        &self,
        doc: &DocRef,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<AppendOutcome> {
        let dir = self.slot_dir(doc);
        let lock = self.locks.for_path(&dir);
        let _guard = lock.write().await;

        let (mut meta, mut records) = self.open_for_write(doc, &dir).await?;
        if meta.version == 0 {
            return Err(CoreError::DocNotFound(doc.to_string()));
        }

        let active_count = records.iter().filter(|r| r.active).count();
        if active_count <= 1 {
            return Ok(AppendOutcome {
                version: meta.version,
                etag: meta.etag.clone(),
                sequence: meta.last_sequence,
                duplicate: true,
                timestamp: meta.updated_at,
            });
        }

        let compiled = compile(&records);
        let now = Utc::now();
        let hash = stable_hash(&compiled);

        for record in records.iter_mut() {
            record.active = false;
        }
        records.push(ChunkRecord {
            sequence: meta.last_sequence + 1,
            timestamp: now,
            op: ChunkOp::Squash,
            content: compiled.clone(),
            user: user.to_string(),
            source,
            hash: hash.clone(),
            active: true,
        });

        // The squash rewrites active flags on prior records, so the whole
        // log is rewritten in place of a plain append.
        write_records_atomic(&dir.join(CHUNKS_FILE), &records).await?;

        let sequence = meta.last_sequence + 1;
        meta.last_sequence = sequence;
        meta.version = sequence;
        meta.chunk_count += 1;
        meta.push_hash(hash);
        meta.updated_at = now;
        // compiled view is unchanged, so the etag is too

        write_atomic(&dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?.as_slice()).await?;
        write_atomic(&dir.join(COMPILED_FILE), compiled.as_bytes()).await?;

        Ok(AppendOutcome {
            version: meta.version,
            etag: meta.etag,
            sequence,
            duplicate: false,
            timestamp: now,
        })
    }

    /// Write-side open: load meta + log, heal a partial write, and run the
    /// legacy migration when applicable.
    async fn open_for_write(
        &self,
        doc: &DocRef,
        dir: &Path,
    ) -> CoreResult<(DocMeta, Vec<ChunkRecord>)> {
        let mut meta = match read_meta(dir).await? {
            Some(meta) => meta,
            None => {
                let now = Utc::now();
                let mut meta = DocMeta::empty(now, stable_hash(""));

                // First write against a legacy `{slot}.md` layout: fold the
                // legacy content in as chunk 1 before the incoming write.
                let legacy = self.legacy_path(doc);
                if let Ok(content) = tokio::fs::read_to_string(&legacy).await {
                    warn!(doc = %doc, "migrating legacy document layout");
                    let hash = stable_hash(&content);
                    let record = ChunkRecord {
                        sequence: 1,
                        timestamp: now,
                        op: ChunkOp::Append,
                        content: content.clone(),
                        user: "system".to_string(),
                        source: ChunkSource::Migration,
                        hash: hash.clone(),
                        active: true,
                    };
                    // Any uncommitted log content predating the migration
                    // is discarded along with it.
                    tokio::fs::create_dir_all(dir).await?;
                    write_records_atomic(&dir.join(CHUNKS_FILE), std::slice::from_ref(&record))
                        .await?;
                    meta.last_sequence = 1;
                    meta.version = 1;
                    meta.chunk_count = 1;
                    meta.etag = hash.clone();
                    meta.push_hash(hash);
                    write_atomic(&dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?.as_slice())
                        .await?;
                    write_atomic(&dir.join(COMPILED_FILE), content.as_bytes()).await?;
                    return Ok((meta, vec![record]));
                }
                meta
            }
        };

        let chunks_path = dir.join(CHUNKS_FILE);
        let mut records = read_records(&chunks_path).await?;

        // Heal a partial write: the log may carry records past the last
        // committed meta. Truncate the log back to the commit point.
        if records.iter().any(|r| r.sequence > meta.last_sequence) {
            warn!(
                doc = %doc,
                last_sequence = meta.last_sequence,
                "healing partial write: truncating chunk log"
            );
            records.retain(|r| r.sequence <= meta.last_sequence);
            write_records_atomic(&chunks_path, &records).await?;
        }

        // A chunk_count drifted by manual edits is repaired from the log.
        if meta.chunk_count != records.len() as u64 {
            meta.chunk_count = records.len() as u64;
        }

        Ok((meta, records))
    }
}

/// Materialise the compiled view: the last active `replace`/`squash`
/// record clears the prefix; active `append` records after it concatenate
/// in sequence order.
pub(crate) fn compile(records: &[ChunkRecord]) -> String {
    let base = records
        .iter()
        .filter(|r| r.active && matches!(r.op, ChunkOp::Replace | ChunkOp::Squash))
        .next_back();

    let mut out = String::new();
    let floor = match base {
        Some(record) => {
            out.push_str(&record.content);
            record.sequence
        }
        None => 0,
    };
    for record in records {
        if record.active && record.op == ChunkOp::Append && record.sequence > floor {
            out.push_str(&record.content);
        }
    }
    out
}

async fn read_meta(dir: &Path) -> CoreResult<Option<DocMeta>> {
    match tokio::fs::read(dir.join(META_FILE)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
            CoreError::Internal(anyhow::anyhow!("corrupt meta.json in {}: {}", dir.display(), e))
        })?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_records(path: &Path) -> CoreResult<Vec<ChunkRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                // A torn final line is the partial-write case; anything
                // before it is corruption worth surfacing.
                if lineno + 1 == raw.lines().count() {
                    warn!(path = %path.display(), "dropping torn trailing chunk record");
                } else {
                    return Err(CoreError::Internal(anyhow::anyhow!(
                        "corrupt chunk record at {}:{}: {}",
                        path.display(),
                        lineno + 1,
                        e
                    )));
                }
            }
        }
    }
    Ok(records)
}

async fn append_record(path: &Path, record: &ChunkRecord) -> CoreResult<()> {
    let mut line = serde_json::to_string(record)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("encode chunk: {}", e)))?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

async fn write_records_atomic(path: &Path, records: &[ChunkRecord]) -> CoreResult<()> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(
            &serde_json::to_string(record)
                .map_err(|e| CoreError::Internal(anyhow::anyhow!("encode chunk: {}", e)))?,
        );
        buf.push('\n');
    }
    write_atomic(path, buf.as_bytes()).await
}

/// The single cross-platform atomicity primitive: write a sibling temp
/// file, then rename over the target.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("no parent for {}", path.display())))?;
    tokio::fs::create_dir_all(parent).await?;
    let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> DocStore {
        DocStore::with_roots(tmp.path().join("projects"), tmp.path().join("meetings"))
    }

    fn feature_list() -> DocRef {
        DocRef::new(
            DocumentScope::Project {
                project_id: "p1".into(),
            },
            Slot::FeatureList,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_append_then_export() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        let out = store
            .append(&doc, AppendRequest::append("A\n", "alice", ChunkSource::Api))
            .await
            .unwrap();
        assert_eq!(out.version, 1);
        assert_eq!(out.sequence, 1);
        assert!(!out.duplicate);

        let export = store.export(&doc).await.unwrap();
        assert_eq!(export.content, "A\n");
        assert_eq!(export.version, 1);
        assert!(export.exists);
        assert_eq!(export.etag, stable_hash("A\n"));
    }

    #[tokio::test]
    async fn test_duplicate_within_window_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::append("A\n", "alice", ChunkSource::Api))
            .await
            .unwrap();
        store
            .append(&doc, AppendRequest::append("B\n", "alice", ChunkSource::Api))
            .await
            .unwrap();
        let third = store
            .append(&doc, AppendRequest::append("B\n", "alice", ChunkSource::Api))
            .await
            .unwrap();

        assert!(third.duplicate);
        assert_eq!(third.version, 2);

        let export = store.export(&doc).await.unwrap();
        assert_eq!(export.content, "A\nB\n");
        assert_eq!(export.version, 2);
    }

    #[tokio::test]
    async fn test_replace_clears_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::append("old\n", "u", ChunkSource::Ui))
            .await
            .unwrap();
        store
            .append(&doc, AppendRequest::replace("new\n", "u", ChunkSource::Ui))
            .await
            .unwrap();
        store
            .append(&doc, AppendRequest::append("tail\n", "u", ChunkSource::Ui))
            .await
            .unwrap();

        let export = store.export(&doc).await.unwrap();
        assert_eq!(export.content, "new\ntail\n");
        assert_eq!(export.version, 3);
    }

    #[tokio::test]
    async fn test_replace_duplicate_is_against_current_view_only() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::replace("state A\n", "u", ChunkSource::Api))
            .await
            .unwrap();
        store
            .append(&doc, AppendRequest::replace("state B\n", "u", ChunkSource::Api))
            .await
            .unwrap();

        // Returning to a previously-seen state is a real write, even
        // though its hash is still in the window.
        let back = store
            .append(&doc, AppendRequest::replace("state A\n", "u", ChunkSource::Api))
            .await
            .unwrap();
        assert!(!back.duplicate);
        assert_eq!(store.export(&doc).await.unwrap().content, "state A\n");

        // Re-writing the current state is a no-op.
        let same = store
            .append(&doc, AppendRequest::replace("state A\n", "u", ChunkSource::Api))
            .await
            .unwrap();
        assert!(same.duplicate);
        assert_eq!(same.version, back.version);
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::append("A\n", "u", ChunkSource::Api))
            .await
            .unwrap();

        let err = store
            .append(
                &doc,
                AppendRequest::append("B\n", "u", ChunkSource::Api).with_expected_version(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::VersionMismatch {
                expected: 5,
                actual: 1
            }
        ));

        // the failed write left nothing behind
        let export = store.export(&doc).await.unwrap();
        assert_eq!(export.content, "A\n");
        assert_eq!(export.version, 1);
    }

    #[tokio::test]
    async fn test_optimistic_lock_only_one_writer_wins() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::append("base\n", "u", ChunkSource::Api))
            .await
            .unwrap();

        let first = store
            .append(
                &doc,
                AppendRequest::append("x\n", "u", ChunkSource::Api).with_expected_version(1),
            )
            .await;
        let second = store
            .append(
                &doc,
                AppendRequest::append("y\n", "u", ChunkSource::Api).with_expected_version(1),
            )
            .await;

        assert_eq!(first.unwrap().version, 2);
        assert!(matches!(
            second.unwrap_err(),
            CoreError::VersionMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_squash_preserves_compiled_view() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        for chunk in ["one\n", "two\n", "three\n"] {
            store
                .append(&doc, AppendRequest::append(chunk, "u", ChunkSource::Api))
                .await
                .unwrap();
        }

        let before = store.export(&doc).await.unwrap();
        let out = store.squash(&doc, "admin", ChunkSource::Cli).await.unwrap();
        assert!(!out.duplicate);
        assert_eq!(out.version, 4);

        let after = store.export(&doc).await.unwrap();
        assert_eq!(before.content, after.content);
        assert_eq!(before.etag, after.etag);

        // prior records retained for audit, inactive
        let chunks = store.list_chunks(&doc).await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().filter(|c| c.active).count(), 1);
        assert_eq!(chunks.last().unwrap().op, ChunkOp::Squash);
    }

    #[tokio::test]
    async fn test_squash_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::append("a\n", "u", ChunkSource::Api))
            .await
            .unwrap();
        store
            .append(&doc, AppendRequest::append("b\n", "u", ChunkSource::Api))
            .await
            .unwrap();

        let first = store.squash(&doc, "u", ChunkSource::Api).await.unwrap();
        assert!(!first.duplicate);

        let second = store.squash(&doc, "u", ChunkSource::Api).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn test_export_never_written() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let export = store.export(&feature_list()).await.unwrap();
        assert!(!export.exists);
        assert_eq!(export.content, "");
        assert_eq!(export.version, 0);
        assert_eq!(export.etag, stable_hash(""));
    }

    #[tokio::test]
    async fn test_partial_write_healed_on_open() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        store
            .append(&doc, AppendRequest::append("A\n", "u", ChunkSource::Api))
            .await
            .unwrap();

        // Simulate a crash after the chunk append but before the meta
        // commit: an extra record in the log with no meta advance.
        let dir = tmp.path().join("projects/p1/docs/feature_list");
        let orphan = ChunkRecord {
            sequence: 2,
            timestamp: Utc::now(),
            op: ChunkOp::Append,
            content: "orphan\n".into(),
            user: "u".into(),
            source: ChunkSource::Api,
            hash: stable_hash("orphan\n"),
            active: true,
        };
        append_record(&dir.join(CHUNKS_FILE), &orphan).await.unwrap();

        // Next write heals the log and proceeds from the committed state.
        let out = store
            .append(&doc, AppendRequest::append("B\n", "u", ChunkSource::Api))
            .await
            .unwrap();
        assert_eq!(out.sequence, 2);

        let export = store.export(&doc).await.unwrap();
        assert_eq!(export.content, "A\nB\n");
        let chunks = store.list_chunks(&doc).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.content != "orphan\n"));
    }

    #[tokio::test]
    async fn test_legacy_layout_read_and_migrate() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list();

        let scope_dir = tmp.path().join("projects/p1");
        tokio::fs::create_dir_all(&scope_dir).await.unwrap();
        tokio::fs::write(scope_dir.join("feature_list.md"), "legacy body\n")
            .await
            .unwrap();

        // Served read-only before any write.
        let export = store.export(&doc).await.unwrap();
        assert!(export.exists);
        assert_eq!(export.content, "legacy body\n");
        assert_eq!(export.version, 0);

        // First write migrates the legacy content as chunk 1.
        let out = store
            .append(&doc, AppendRequest::append("fresh\n", "u", ChunkSource::Api))
            .await
            .unwrap();
        assert_eq!(out.version, 2);

        let export = store.export(&doc).await.unwrap();
        assert_eq!(export.content, "legacy body\nfresh\n");

        let chunks = store.list_chunks(&doc).await.unwrap();
        assert_eq!(chunks[0].source, ChunkSource::Migration);
        assert_eq!(chunks[0].sequence, 1);
    }

    #[tokio::test]
    async fn test_squash_on_missing_doc_fails() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let err = store
            .squash(&feature_list(), "u", ChunkSource::Api)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DocNotFound(_)));
    }

    #[test]
    fn test_compile_ignores_inactive() {
        let mk = |seq, op, content: &str, active| ChunkRecord {
            sequence: seq,
            timestamp: Utc::now(),
            op,
            content: content.into(),
            user: "u".into(),
            source: ChunkSource::Api,
            hash: stable_hash(content),
            active,
        };
        let records = vec![
            mk(1, ChunkOp::Append, "a", false),
            mk(2, ChunkOp::Append, "b", false),
            mk(3, ChunkOp::Squash, "ab", true),
            mk(4, ChunkOp::Append, "c", true),
        ];
        assert_eq!(compile(&records), "abc");
    }
}
