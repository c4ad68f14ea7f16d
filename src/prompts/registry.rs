//! Layered template resolution with cached parsed sets.

use super::models::*;
use super::parser;
use super::TRIGGER_FILE;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Template files above this size log a warning but are still parsed.
const SIZE_WARN_BYTES: u64 = 100 * 1024;

struct CacheEntry {
    templates: Vec<PromptTemplate>,
    loaded_at: Instant,
    dir_mtime: Option<SystemTime>,
}

/// The process-wide prompt registry. Mutation happens only through the
/// filesystem; the registry reads, caches, and invalidates.
pub struct PromptRegistry {
    /// Static built-in `*.prompt.md` templates.
    static_dir: Option<PathBuf>,
    /// Root under which dynamic template directories and the trigger file
    /// live.
    data_root: PathBuf,
    ttl: Duration,
    static_cache: RwLock<Option<CacheEntry>>,
    /// Caches the global dynamic layer. User and project layers are small
    /// per-principal sets and are read on each call.
    dynamic_cache: RwLock<Option<CacheEntry>>,
}

impl PromptRegistry {
    pub fn new(static_dir: Option<PathBuf>, data_root: PathBuf, ttl_minutes: u64) -> Self {
        Self {
            static_dir,
            data_root,
            ttl: Duration::from_secs(ttl_minutes * 60),
            static_cache: RwLock::new(None),
            dynamic_cache: RwLock::new(None),
        }
    }

    /// Resolution view for one user: built-in set, then dynamic templates
    /// from global, user, project directories, in that order, with
    /// first-wins name de-duplication.
    pub async fn get_user_prompts(
        &self,
        username: &str,
        project_id: Option<&str>,
        _task_id: Option<&str>,
    ) -> CoreResult<Vec<TemplateMetadata>> {
        let templates = self.resolve(username, project_id).await?;
        Ok(templates.iter().map(TemplateMetadata::from).collect())
    }

    /// Resolve one template by name and substitute arguments into it.
    pub async fn get_prompt(
        &self,
        name: &str,
        args: &HashMap<String, String>,
        username: &str,
        project_id: Option<&str>,
    ) -> CoreResult<FilledPrompt> {
        let templates = self.resolve(username, project_id).await?;
        let template = templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CoreError::TemplateNotFound(name.to_string()))?;
        parser::fill(template, args)
    }

    async fn resolve(
        &self,
        username: &str,
        project_id: Option<&str>,
    ) -> CoreResult<Vec<PromptTemplate>> {
        let force = self.consume_trigger();

        let mut merged: Vec<PromptTemplate> = Vec::new();
        let push_all = |templates: Vec<PromptTemplate>, merged: &mut Vec<PromptTemplate>| {
            for template in templates {
                if merged.iter().any(|t| t.name == template.name) {
                    continue;
                }
                merged.push(template);
            }
        };

        push_all(self.static_set(force).await?, &mut merged);
        push_all(self.global_dynamic_set(force).await?, &mut merged);
        push_all(
            load_dynamic_dir(
                &self.data_root.join("users").join(username).join("prompts"),
                TemplateScope::User,
                None,
            ),
            &mut merged,
        );
        if let Some(project_id) = project_id {
            push_all(
                load_dynamic_dir(
                    &self
                        .data_root
                        .join("projects")
                        .join(project_id)
                        .join("prompts"),
                    TemplateScope::Project,
                    Some(project_id),
                ),
                &mut merged,
            );
        }
        Ok(merged)
    }

    /// Consume the trigger file, returning `true` when a reload must be
    /// forced. A removal failure still invalidates the caches.
    fn consume_trigger(&self) -> bool {
        let trigger = self.data_root.join(TRIGGER_FILE);
        if !trigger.exists() {
            return false;
        }
        if let Err(e) = std::fs::remove_file(&trigger) {
            warn!(path = %trigger.display(), error = %e, "failed to remove prompts trigger file");
        }
        debug!("prompts trigger file sighted; forcing reload");
        true
    }

    async fn static_set(&self, force: bool) -> CoreResult<Vec<PromptTemplate>> {
        let dir = match &self.static_dir {
            Some(dir) => dir.clone(),
            None => return Ok(Vec::new()),
        };
        cached_load(&self.static_cache, &dir, self.ttl, force, || {
            load_static_dir(&dir)
        })
        .await
    }

    async fn global_dynamic_set(&self, force: bool) -> CoreResult<Vec<PromptTemplate>> {
        let dir = self.data_root.join("prompts").join("global");
        cached_load(&self.dynamic_cache, &dir, self.ttl, force, || {
            load_dynamic_dir(&dir, TemplateScope::Global, None)
        })
        .await
    }
}

/// Double-checked cache lookup: read-lock fast path, then write-lock,
/// re-check, reload.
async fn cached_load<F>(
    cache: &RwLock<Option<CacheEntry>>,
    dir: &Path,
    ttl: Duration,
    force: bool,
    load: F,
) -> CoreResult<Vec<PromptTemplate>>
where
    F: Fn() -> Vec<PromptTemplate>,
{
    if !force {
        let guard = cache.read().await;
        if let Some(entry) = guard.as_ref() {
            if entry_valid(entry, dir, ttl) {
                return Ok(entry.templates.clone());
            }
        }
    }

    let mut guard = cache.write().await;
    if !force {
        if let Some(entry) = guard.as_ref() {
            if entry_valid(entry, dir, ttl) {
                return Ok(entry.templates.clone());
            }
        }
    }

    let templates = load();
    *guard = Some(CacheEntry {
        templates: templates.clone(),
        loaded_at: Instant::now(),
        dir_mtime: dir_mtime(dir),
    });
    Ok(templates)
}

fn entry_valid(entry: &CacheEntry, dir: &Path, ttl: Duration) -> bool {
    if entry.loaded_at.elapsed() >= ttl {
        return false;
    }
    match (entry.dir_mtime, dir_mtime(dir)) {
        (Some(snapshot), Some(current)) => current <= snapshot,
        (None, None) => true,
        _ => false,
    }
}

fn dir_mtime(dir: &Path) -> Option<SystemTime> {
    std::fs::metadata(dir).ok()?.modified().ok()
}

/// Load every `*.prompt.md` under the static directory. A single bad file
/// is logged and skipped; the batch never aborts.
fn load_static_dir(dir: &Path) -> Vec<PromptTemplate> {
    let mut templates = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(".prompt.md"))
            .unwrap_or(false)
        {
            continue;
        }
        if !path_within(path, dir) {
            warn!(path = %path.display(), "skipping template outside its base directory");
            continue;
        }
        check_size(path);
        match std::fs::read_to_string(path) {
            Ok(raw) => match parser::parse_static(path, &raw) {
                Ok(template) => templates.push(template),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unparsable template"),
            },
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable template"),
        }
    }
    templates
}

/// Load every `*.json` dynamic template in one directory layer.
fn load_dynamic_dir(
    dir: &Path,
    scope: TemplateScope,
    project_id: Option<&str>,
) -> Vec<PromptTemplate> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        if !path_within(&path, dir) {
            warn!(path = %path.display(), "skipping template outside its base directory");
            continue;
        }
        check_size(&path);
        let parsed: Result<DynamicTemplateFile, _> = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(file) => templates.push(PromptTemplate {
                name: file.name,
                description: file.description,
                arguments: file.arguments,
                content: file.content,
                scope,
                project_id: project_id.map(String::from),
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unparsable template"),
        }
    }
    templates
}

/// On-disk shape of a dynamic template; scope and project are assigned
/// from the directory layer, not the file.
#[derive(serde::Deserialize)]
struct DynamicTemplateFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    arguments: Vec<TemplateArgument>,
    content: String,
}

/// Path-traversal guard: after absolute resolution the file must still
/// reside inside its declared base directory.
fn path_within(path: &Path, base: &Path) -> bool {
    match (path.canonicalize(), base.canonicalize()) {
        (Ok(path), Ok(base)) => path.starts_with(&base),
        _ => false,
    }
}

fn check_size(path: &Path) {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() > SIZE_WARN_BYTES {
            warn!(
                path = %path.display(),
                bytes = meta.len(),
                "template file exceeds 100 KiB; parsing anyway"
            );
        }
    }
}
