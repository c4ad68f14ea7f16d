//! Integration tests for the document store: chunk log semantics,
//! optimistic locking, squash, sections, and crash recovery.

use project_governor::docs::{
    AppendRequest, ChunkOp, ChunkSource, DocRef, DocStore, DocumentScope, SectionTree, Slot,
    SyncDirection,
};
use project_governor::error::CoreError;
use std::sync::Arc;
use tempfile::TempDir;

fn store(tmp: &TempDir) -> DocStore {
    DocStore::with_roots(tmp.path().join("projects"), tmp.path().join("meetings"))
}

fn feature_list(project_id: &str) -> DocRef {
    DocRef::new(
        DocumentScope::Project {
            project_id: project_id.into(),
        },
        Slot::FeatureList,
    )
    .unwrap()
}

// ============================================================================
// Append / export
// ============================================================================

/// Three sequential appends "A\n", "B\n", "B\n": the third is a duplicate
/// no-op, the version stays at 2, and the export is the concatenation of
/// the accepted writes.
#[tokio::test]
async fn test_sequential_appends_with_duplicate() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = feature_list("p1");

    let first = store
        .append(&doc, AppendRequest::append("A\n", "alice", ChunkSource::Api))
        .await
        .unwrap();
    assert_eq!(first.version, 1);
    assert!(!first.duplicate);

    let second = store
        .append(&doc, AppendRequest::append("B\n", "alice", ChunkSource::Api))
        .await
        .unwrap();
    assert_eq!(second.version, 2);

    let third = store
        .append(&doc, AppendRequest::append("B\n", "alice", ChunkSource::Api))
        .await
        .unwrap();
    assert!(third.duplicate);
    assert_eq!(third.version, 2);
    assert_eq!(third.etag, second.etag);

    let export = store.export(&doc).await.unwrap();
    assert_eq!(export.content, "A\nB\n");
    assert_eq!(export.version, 2);
}

/// The export equals the concatenation of accepted contents in call
/// order, and the version equals the number of accepted writes.
#[tokio::test]
async fn test_export_is_concatenation_of_accepted_writes() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = feature_list("p1");

    let writes = ["one\n", "two\n", "one\n", "three\n", "two\n", "four\n"];
    let mut expected = String::new();
    let mut accepted = 0u64;
    for content in writes {
        let outcome = store
            .append(&doc, AppendRequest::append(content, "u", ChunkSource::Ui))
            .await
            .unwrap();
        if !outcome.duplicate {
            expected.push_str(content);
            accepted += 1;
        }
    }

    let export = store.export(&doc).await.unwrap();
    assert_eq!(export.content, expected);
    assert_eq!(export.version, accepted);
}

/// Old content that has rotated out of the 16-entry hash window is
/// accepted again.
#[tokio::test]
async fn test_duplicate_detection_window_is_bounded() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = feature_list("p1");

    store
        .append(&doc, AppendRequest::append("first\n", "u", ChunkSource::Api))
        .await
        .unwrap();
    for i in 0..16 {
        store
            .append(
                &doc,
                AppendRequest::append(format!("filler {}\n", i), "u", ChunkSource::Api),
            )
            .await
            .unwrap();
    }

    let outcome = store
        .append(&doc, AppendRequest::append("first\n", "u", ChunkSource::Api))
        .await
        .unwrap();
    assert!(!outcome.duplicate);
}

// ============================================================================
// Optimistic locking
// ============================================================================

/// If an append with expected_version=k succeeds, no other append with
/// expected_version=k can succeed afterwards.
#[tokio::test]
async fn test_optimistic_lock_is_single_winner() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = feature_list("p1");

    store
        .append(&doc, AppendRequest::append("base\n", "u", ChunkSource::Api))
        .await
        .unwrap();

    let winner = store
        .append(
            &doc,
            AppendRequest::append("winner\n", "u", ChunkSource::Api).with_expected_version(1),
        )
        .await
        .unwrap();
    assert_eq!(winner.version, 2);

    let loser = store
        .append(
            &doc,
            AppendRequest::append("loser\n", "u", ChunkSource::Api).with_expected_version(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        loser,
        CoreError::VersionMismatch {
            expected: 1,
            actual: 2
        }
    ));

    let export = store.export(&doc).await.unwrap();
    assert!(!export.content.contains("loser"));
}

/// Concurrent unconditional appends to one document all land, each with a
/// distinct sequence, and the export contains every chunk exactly once.
#[tokio::test]
async fn test_concurrent_appends_serialise() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(store(&tmp));
    let doc = feature_list("p1");

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let doc = doc.clone();
        handles.push(tokio::spawn(async move {
            store
                .append(
                    &doc,
                    AppendRequest::append(format!("line {}\n", i), "u", ChunkSource::Api),
                )
                .await
                .unwrap()
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap().sequence);
    }
    sequences.sort();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());

    let export = store.export(&doc).await.unwrap();
    assert_eq!(export.version, 8);
    for i in 0..8 {
        assert_eq!(export.content.matches(&format!("line {}\n", i)).count(), 1);
    }
}

// ============================================================================
// Squash
// ============================================================================

/// Squash preserves the compiled view: identical content and etag before
/// and after, with the audit trail retained.
#[tokio::test]
async fn test_squash_preserves_view_and_audit_trail() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = feature_list("p1");

    for chunk in ["alpha\n", "beta\n", "gamma\n"] {
        store
            .append(&doc, AppendRequest::append(chunk, "u", ChunkSource::Api))
            .await
            .unwrap();
    }

    let before = store.export(&doc).await.unwrap();
    store.squash(&doc, "admin", ChunkSource::Cli).await.unwrap();
    let after = store.export(&doc).await.unwrap();

    assert_eq!(before.content, after.content);
    assert_eq!(before.etag, after.etag);

    let chunks = store.list_chunks(&doc).await.unwrap();
    assert_eq!(chunks.len(), 4);
    let active: Vec<_> = chunks.iter().filter(|c| c.active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].op, ChunkOp::Squash);
    assert_eq!(active[0].content, "alpha\nbeta\ngamma\n");

    // second squash over the single active chunk is a no-op
    let repeat = store.squash(&doc, "admin", ChunkSource::Cli).await.unwrap();
    assert!(repeat.duplicate);
}

// ============================================================================
// Recovery
// ============================================================================

/// A log tail past the committed meta (a torn write) is truncated on the
/// next open, and writing continues from the committed state.
#[tokio::test]
async fn test_torn_write_recovery() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = feature_list("p1");

    store
        .append(&doc, AppendRequest::append("safe\n", "u", ChunkSource::Api))
        .await
        .unwrap();

    // Simulate a crash between the chunk append and the meta rename.
    let log = tmp.path().join("projects/p1/docs/feature_list/chunks.jsonl");
    let mut raw = std::fs::read_to_string(&log).unwrap();
    let orphan = raw.replace("\"sequence\":1", "\"sequence\":2");
    raw.push_str(&orphan);
    std::fs::write(&log, raw).unwrap();

    let outcome = store
        .append(&doc, AppendRequest::append("next\n", "u", ChunkSource::Api))
        .await
        .unwrap();
    assert_eq!(outcome.sequence, 2);

    let export = store.export(&doc).await.unwrap();
    assert_eq!(export.content, "safe\nnext\n");
}

// ============================================================================
// Sections
// ============================================================================

const SECTIONED: &str = "\
preamble text

## Overview
overview body

### Details
detail body

## Usage
usage body
";

async fn seeded_doc(store: &DocStore) -> DocRef {
    let doc = feature_list("p1");
    store
        .append(&doc, AppendRequest::append(SECTIONED, "u", ChunkSource::Api))
        .await
        .unwrap();
    doc
}

#[tokio::test]
async fn test_get_sections_builds_tree() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = seeded_doc(&store).await;

    let sections = store.get_sections(&doc).await.unwrap();
    assert_eq!(sections.len(), 3);
    assert_eq!(sections[0].title, "Overview");
    assert_eq!(sections[1].title, "Details");
    assert_eq!(sections[1].parent_id, Some(sections[0].id.clone()));
    assert_eq!(sections[2].title, "Usage");
    assert_eq!(sections[2].parent_id, None);
}

/// Section update at a stale expected version fails with VersionMismatch
/// and leaves both the compiled view and the meta untouched.
#[tokio::test]
async fn test_section_update_stale_version_changes_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = seeded_doc(&store).await; // version 1

    let sections = store.get_sections(&doc).await.unwrap();
    let err = store
        .update_section(
            &doc,
            &sections[0].id,
            "replaced\n",
            Some(5),
            "u",
            ChunkSource::Api,
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

    let export = store.export(&doc).await.unwrap();
    assert_eq!(export.content, SECTIONED);
    assert_eq!(export.version, 1);
}

/// A section update replaces the whole region up to the next
/// same-or-higher heading, child headings included.
#[tokio::test]
async fn test_section_update_replaces_subtree_body() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = seeded_doc(&store).await;

    let sections = store.get_sections(&doc).await.unwrap();
    let overview = &sections[0];
    store
        .update_section(&doc, &overview.id, "fresh body\n\n", None, "u", ChunkSource::Api)
        .await
        .unwrap();

    let export = store.export(&doc).await.unwrap();
    assert!(export.content.contains("## Overview\nfresh body\n"));
    assert!(!export.content.contains("### Details"));
    assert!(export.content.contains("## Usage\nusage body\n"));
    assert_eq!(export.version, 2);

    let chunks = store.list_chunks(&doc).await.unwrap();
    assert_eq!(chunks.last().unwrap().op, ChunkOp::Replace);
}

#[tokio::test]
async fn test_delete_section_cascade_rules() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = seeded_doc(&store).await;

    let sections = store.get_sections(&doc).await.unwrap();
    let overview_id = sections[0].id.clone();

    let err = store
        .delete_section(&doc, &overview_id, false, None, "u", ChunkSource::Api)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SectionHasChildren(_)));

    store
        .delete_section(&doc, &overview_id, true, None, "u", ChunkSource::Api)
        .await
        .unwrap();
    let export = store.export(&doc).await.unwrap();
    assert!(!export.content.contains("## Overview"));
    assert!(!export.content.contains("### Details"));
    assert!(export.content.contains("## Usage"));
}

#[tokio::test]
async fn test_insert_section_after_sibling_and_at_root() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = seeded_doc(&store).await;

    let sections = store.get_sections(&doc).await.unwrap();
    let overview_id = sections[0].id.clone();

    // sibling insert lands after Overview's subtree, before Usage
    store
        .insert_section(
            &doc,
            "Design",
            "design body\n\n",
            Some(&overview_id),
            None,
            "u",
            ChunkSource::Api,
        )
        .await
        .unwrap();
    let export = store.export(&doc).await.unwrap();
    let design_at = export.content.find("## Design").unwrap();
    let usage_at = export.content.find("## Usage").unwrap();
    assert!(design_at < usage_at);

    // root insert appends at the end of the document
    store
        .insert_section(&doc, "Appendix", "appendix body\n", None, None, "u", ChunkSource::Api)
        .await
        .unwrap();
    let export = store.export(&doc).await.unwrap();
    assert!(export.content.ends_with("## Appendix\nappendix body\n"));
}

/// Section round-trip: split to files, reassemble, byte-identical
/// compiled view.
#[tokio::test]
async fn test_sync_sections_round_trip_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let doc = seeded_doc(&store).await;

    let before = store.export(&doc).await.unwrap();

    store
        .sync_sections(&doc, SyncDirection::FromCompiled, "u", ChunkSource::Api)
        .await
        .unwrap();
    store
        .sync_sections(&doc, SyncDirection::ToCompiled, "u", ChunkSource::Api)
        .await
        .unwrap();

    let after = store.export(&doc).await.unwrap();
    assert_eq!(before.content, after.content);
    assert_eq!(before.etag, after.etag);
}

/// The same round-trip holds for documents with code fences, duplicate
/// titles, and no trailing newline.
#[tokio::test]
async fn test_sync_round_trip_awkward_documents() {
    let awkward = [
        "## Same\nbody one\n\n## Same\nbody two\n",
        "no headings at all\njust text\n",
        "## Fenced\n```\n## not a heading\n```\n",
        "## No trailing newline\nbody",
        "",
    ];

    for (i, content) in awkward.iter().enumerate() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let doc = feature_list(&format!("p{}", i));
        if !content.is_empty() {
            store
                .append(&doc, AppendRequest::append(*content, "u", ChunkSource::Api))
                .await
                .unwrap();
        }

        let before = store.export(&doc).await.unwrap();
        store
            .sync_sections(&doc, SyncDirection::FromCompiled, "u", ChunkSource::Api)
            .await
            .unwrap();
        store
            .sync_sections(&doc, SyncDirection::ToCompiled, "u", ChunkSource::Api)
            .await
            .unwrap();
        let after = store.export(&doc).await.unwrap();
        assert_eq!(before.content, after.content, "case {}", i);
    }

    // the pure parse/render round-trip holds for the same inputs
    for content in awkward {
        assert_eq!(SectionTree::parse(content).render(), content);
    }
}
