//! Section-level editing over a document's compiled view.
//!
//! A section is a Markdown heading in `compiled.md`; sections form a tree
//! by heading depth, represented as a flat arena with `parent_id` +
//! `order` fields. Section ids are stable hashes of title+position and are
//! regenerated on every parse. All mutations rewrite `compiled.md` and
//! commit a single `replace` chunk through the store, so the chunk log
//! stays the only history.

use super::hashing::section_id;
use super::models::{AppendOutcome, AppendRequest, ChunkSource, DocRef};
use super::store::{write_atomic, DocStore};
use crate::error::{CoreError, CoreResult};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const SECTIONS_DIR: &str = "sections";
const INDEX_FILE: &str = "index.json";
const PREAMBLE_FILE: &str = "_preamble.md";

/// Direction of a section sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// `compiled.md` → `sections/*.md`
    FromCompiled,
    /// `sections/*.md` → `compiled.md` (emits a `replace` chunk)
    ToCompiled,
}

/// Section metadata as returned by `get_sections`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub level: usize,
    pub parent_id: Option<String>,
    pub order: usize,
}

/// A section with its body content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionContent {
    pub id: String,
    pub title: String,
    pub level: usize,
    pub content: String,
}

/// Result of a `sync_sections` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub direction: SyncDirection,
    pub section_count: usize,
    /// Document version after the sync (unchanged for `from_compiled`).
    pub version: u64,
}

/// On-disk manifest that makes the section split reversible.
#[derive(Debug, Serialize, Deserialize)]
struct SectionIndex {
    order: Vec<String>,
    has_preamble: bool,
    ends_with_newline: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    title: String,
    level: usize,
    heading_line: usize,
}

/// Parsed line-level view of a compiled document.
#[derive(Debug)]
pub struct SectionTree {
    lines: Vec<String>,
    ends_with_newline: bool,
    entries: Vec<Entry>,
}

impl SectionTree {
    /// Parse a compiled view into lines + heading entries. Headings inside
    /// fenced code blocks are ignored.
    pub fn parse(content: &str) -> Self {
        let ends_with_newline = content.ends_with('\n');
        let mut lines: Vec<String> = if content.is_empty() {
            Vec::new()
        } else {
            content.split('\n').map(String::from).collect()
        };
        if ends_with_newline {
            lines.pop();
        }

        let mut entries = Vec::new();
        let mut in_fence = false;
        for (idx, line) in lines.iter().enumerate() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if let Some((level, title)) = parse_heading(line) {
                let position = entries.len();
                entries.push(Entry {
                    id: section_id(&title, position),
                    title,
                    level,
                    heading_line: idx,
                });
            }
        }

        Self {
            lines,
            ends_with_newline,
            entries,
        }
    }

    /// Render back to the exact original bytes.
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.ends_with_newline {
            out.push('\n');
        }
        out
    }

    pub fn sections(&self) -> Vec<Section> {
        self.entries
            .iter()
            .enumerate()
            .map(|(order, entry)| Section {
                id: entry.id.clone(),
                title: entry.title.clone(),
                level: entry.level,
                parent_id: self.parent_of(order).map(|p| self.entries[p].id.clone()),
                order,
            })
            .collect()
    }

    fn find(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Nearest previous heading with a strictly smaller level.
    fn parent_of(&self, index: usize) -> Option<usize> {
        let level = self.entries[index].level;
        self.entries[..index]
            .iter()
            .rposition(|e| e.level < level)
    }

    fn has_children(&self, index: usize) -> bool {
        let level = self.entries[index].level;
        self.entries
            .get(index + 1)
            .map(|next| next.level > level)
            .unwrap_or(false)
    }

    /// End of the section's own body: the next heading of any level.
    fn own_end(&self, index: usize) -> usize {
        self.entries
            .get(index + 1)
            .map(|e| e.heading_line)
            .unwrap_or(self.lines.len())
    }

    /// End of the section's subtree: the next same-or-higher heading.
    fn subtree_end(&self, index: usize) -> usize {
        let level = self.entries[index].level;
        self.entries[index + 1..]
            .iter()
            .find(|e| e.level <= level)
            .map(|e| e.heading_line)
            .unwrap_or(self.lines.len())
    }

    fn block(&self, start: usize, end: usize) -> String {
        if start >= end {
            return String::new();
        }
        let mut out = self.lines[start..end].join("\n");
        out.push('\n');
        out
    }

    fn preamble_end(&self) -> usize {
        self.entries
            .first()
            .map(|e| e.heading_line)
            .unwrap_or(self.lines.len())
    }

    /// Replace the line range `[start, end)` with the lines of `content`.
    fn splice(&mut self, start: usize, end: usize, content: &str) {
        let replacement = block_lines(content);
        self.lines.splice(start..end, replacement);
        if self.lines.is_empty() {
            self.ends_with_newline = false;
        }
    }
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    let title = rest.strip_prefix(' ')?;
    Some((hashes, title.trim().to_string()))
}

/// Split a newline-terminated block into complete lines.
fn block_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    if content.ends_with('\n') {
        lines.pop();
    }
    lines
}

impl DocStore {
    /// List all sections of the document's compiled view.
    pub async fn get_sections(&self, doc: &DocRef) -> CoreResult<Vec<Section>> {
        let export = self.export(doc).await?;
        Ok(SectionTree::parse(&export.content).sections())
    }

    /// Fetch one section's body. With `include_children` the subtree body
    /// (child headings included) is returned; otherwise only the lines up
    /// to the next heading. The heading line itself is never part of the
    /// content.
    pub async fn get_section(
        &self,
        doc: &DocRef,
        id: &str,
        include_children: bool,
    ) -> CoreResult<SectionContent> {
        let export = self.export(doc).await?;
        let tree = SectionTree::parse(&export.content);
        let index = tree
            .find(id)
            .ok_or_else(|| CoreError::SectionNotFound(id.to_string()))?;

        let start = tree.entries[index].heading_line + 1;
        let end = if include_children {
            tree.subtree_end(index)
        } else {
            tree.own_end(index)
        };

        Ok(SectionContent {
            id: tree.entries[index].id.clone(),
            title: tree.entries[index].title.clone(),
            level: tree.entries[index].level,
            content: tree.block(start, end),
        })
    }

    /// Replace a section's body (heading exclusive, next same-or-higher
    /// heading exclusive). Re-titling requires delete + insert.
    pub async fn update_section(
        &self,
        doc: &DocRef,
        id: &str,
        content: &str,
        expected_version: Option<u64>,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<AppendOutcome> {
        let export = self.export(doc).await?;
        check_expected(expected_version, export.version)?;

        let mut tree = SectionTree::parse(&export.content);
        let index = tree
            .find(id)
            .ok_or_else(|| CoreError::SectionNotFound(id.to_string()))?;

        let start = tree.entries[index].heading_line + 1;
        let end = tree.subtree_end(index);
        tree.splice(start, end, content);

        self.commit_rewrite(doc, tree.render(), export.version, user, source)
            .await
    }

    /// Insert a new section. With `after_section_id` the section becomes a
    /// sibling placed after that section's subtree; with `None` it is
    /// appended at the end of the document root.
    pub async fn insert_section(
        &self,
        doc: &DocRef,
        title: &str,
        content: &str,
        after_section_id: Option<&str>,
        expected_version: Option<u64>,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<AppendOutcome> {
        let export = self.export(doc).await?;
        check_expected(expected_version, export.version)?;

        let mut tree = SectionTree::parse(&export.content);

        let (at, level) = match after_section_id {
            Some(after_id) => {
                let index = tree
                    .find(after_id)
                    .ok_or_else(|| CoreError::SectionNotFound(after_id.to_string()))?;
                (tree.subtree_end(index), tree.entries[index].level)
            }
            None => {
                // Root siblings share the level of the first root section;
                // a document with no headings starts at level 2.
                let level = tree
                    .sections()
                    .iter()
                    .find(|s| s.parent_id.is_none())
                    .map(|s| s.level)
                    .unwrap_or(2);
                (tree.lines.len(), level)
            }
        };

        let mut block = format!("{} {}\n", "#".repeat(level), title);
        block.push_str(content);
        if !content.is_empty() && !content.ends_with('\n') {
            block.push('\n');
        }
        tree.splice(at, at, &block);
        if !tree.lines.is_empty() {
            tree.ends_with_newline = true;
        }

        self.commit_rewrite(doc, tree.render(), export.version, user, source)
            .await
    }

    /// Delete a section. With subsections present, `cascade=false` fails
    /// `SectionHasChildren`; `cascade=true` removes the whole subtree.
    pub async fn delete_section(
        &self,
        doc: &DocRef,
        id: &str,
        cascade: bool,
        expected_version: Option<u64>,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<AppendOutcome> {
        let export = self.export(doc).await?;
        check_expected(expected_version, export.version)?;

        let mut tree = SectionTree::parse(&export.content);
        let index = tree
            .find(id)
            .ok_or_else(|| CoreError::SectionNotFound(id.to_string()))?;

        if tree.has_children(index) && !cascade {
            return Err(CoreError::SectionHasChildren(id.to_string()));
        }

        let start = tree.entries[index].heading_line;
        let end = if cascade {
            tree.subtree_end(index)
        } else {
            tree.own_end(index)
        };
        tree.splice(start, end, "");

        self.commit_rewrite(doc, tree.render(), export.version, user, source)
            .await
    }

    /// Synchronise `compiled.md` and the per-section files.
    ///
    /// `from_compiled` splits the compiled view into `sections/*.md` plus
    /// an order manifest; `to_compiled` reassembles the files and commits
    /// the result as a `replace` chunk. A split immediately followed by a
    /// reassemble yields a byte-identical compiled view.
    pub async fn sync_sections(
        &self,
        doc: &DocRef,
        direction: SyncDirection,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<SyncOutcome> {
        match direction {
            SyncDirection::FromCompiled => self.sync_from_compiled(doc).await,
            SyncDirection::ToCompiled => self.sync_to_compiled(doc, user, source).await,
        }
    }

    async fn sync_from_compiled(&self, doc: &DocRef) -> CoreResult<SyncOutcome> {
        let export = self.export(doc).await?;
        let tree = SectionTree::parse(&export.content);
        let dir = self.sections_dir(doc);

        // Rebuild the directory from scratch so stale files from a
        // previous sync cannot leak into the next reassembly.
        if tokio::fs::metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;

        let preamble = tree.block(0, tree.preamble_end());
        let has_preamble = !preamble.is_empty();
        if has_preamble {
            write_atomic(&dir.join(PREAMBLE_FILE), preamble.as_bytes()).await?;
        }

        let mut order = Vec::with_capacity(tree.entries.len());
        let mut writes = Vec::with_capacity(tree.entries.len());
        for (i, entry) in tree.entries.iter().enumerate() {
            let body = tree.block(entry.heading_line, tree.own_end(i));
            let path = dir.join(format!("{}.md", entry.id));
            order.push(entry.id.clone());
            writes.push(async move { write_atomic(&path, body.as_bytes()).await });
        }
        try_join_all(writes).await?;

        let index = SectionIndex {
            order,
            has_preamble,
            ends_with_newline: tree.ends_with_newline,
        };
        write_atomic(&dir.join(INDEX_FILE), serde_json::to_vec_pretty(&index)?.as_slice()).await?;

        debug!(doc = %doc, sections = tree.entries.len(), "split compiled view into section files");
        Ok(SyncOutcome {
            direction: SyncDirection::FromCompiled,
            section_count: tree.entries.len(),
            version: export.version,
        })
    }

    async fn sync_to_compiled(
        &self,
        doc: &DocRef,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<SyncOutcome> {
        let dir = self.sections_dir(doc);
        let index: SectionIndex = match tokio::fs::read(dir.join(INDEX_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::SectionNotFound(format!(
                    "{}/{} (run sync from_compiled first)",
                    SECTIONS_DIR, INDEX_FILE
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines: Vec<String> = Vec::new();
        if index.has_preamble {
            lines.extend(read_block_lines(&dir.join(PREAMBLE_FILE)).await?);
        }
        for id in &index.order {
            let path = dir.join(format!("{}.md", id));
            match read_block_lines(&path).await {
                Ok(block) => lines.extend(block),
                Err(CoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(CoreError::SectionNotFound(id.clone()))
                }
                Err(e) => return Err(e),
            }
        }

        let mut content = lines.join("\n");
        if index.ends_with_newline && !lines.is_empty() {
            content.push('\n');
        }

        let export = self.export(doc).await?;
        let outcome = self
            .commit_rewrite(doc, content, export.version, user, source)
            .await?;

        Ok(SyncOutcome {
            direction: SyncDirection::ToCompiled,
            section_count: index.order.len(),
            version: outcome.version,
        })
    }

    /// Commit a full-document rewrite as one `replace` chunk, guarded by
    /// the version observed when the rewrite was computed.
    async fn commit_rewrite(
        &self,
        doc: &DocRef,
        content: String,
        observed_version: u64,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<AppendOutcome> {
        self.append(
            doc,
            AppendRequest::replace(content, user, source).with_expected_version(observed_version),
        )
        .await
    }

    fn sections_dir(&self, doc: &DocRef) -> std::path::PathBuf {
        self.slot_dir(doc).join(SECTIONS_DIR)
    }
}

fn check_expected(expected: Option<u64>, actual: u64) -> CoreResult<()> {
    if let Some(expected) = expected {
        if expected != actual {
            return Err(CoreError::VersionMismatch { expected, actual });
        }
    }
    Ok(())
}

async fn read_block_lines(path: &Path) -> CoreResult<Vec<String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(block_lines(&raw))
}
