//! Versioned document store.
//!
//! Every governed document is an append-only JSONL chunk log plus a
//! materialised `compiled.md` view and a `meta.json` commit record, kept
//! under a per-scope directory layout. The store serialises writers per
//! document path and heals partial writes on open.

pub mod hashing;
pub mod locks;
pub mod models;
pub mod sections;
pub mod store;

pub use models::{
    AppendOutcome, AppendRequest, ChunkOp, ChunkRecord, ChunkSource, DocMeta, DocRef,
    DocumentScope, ExportResult, Slot,
};
pub use sections::{Section, SectionContent, SectionTree, SyncDirection, SyncOutcome};
pub use store::DocStore;
