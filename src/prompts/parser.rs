//! Static template parsing and placeholder substitution.
//!
//! A static template is a Markdown file named `*.prompt.md`, optionally
//! starting with a YAML front-matter block declaring name, description
//! and arguments. Without front-matter, the name falls back to the
//! filename stem (then the first `#` heading) and arguments are
//! discovered by scanning the body for `{{identifier}}` placeholders.

use super::models::*;
use crate::error::{CoreError, CoreResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Only bare identifiers count; `{{ not an id }}` stays literal.
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder regex"))
}

#[derive(Debug, Default, Deserialize)]
struct StaticFrontMatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    arguments: Vec<FrontMatterArgument>,
}

#[derive(Debug, Deserialize)]
struct FrontMatterArgument {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
}

/// Parse one static `*.prompt.md` file.
pub fn parse_static(path: &Path, raw: &str) -> CoreResult<PromptTemplate> {
    let (front, body) = split_front_matter(raw)?;

    let name = front
        .name
        .clone()
        .or_else(|| filename_stem(path))
        .or_else(|| first_heading(body))
        .ok_or_else(|| {
            CoreError::Internal(anyhow::anyhow!(
                "cannot derive a template name for {}",
                path.display()
            ))
        })?;

    let arguments = if front.arguments.is_empty() {
        discover_placeholders(body)
            .into_iter()
            .map(|name| TemplateArgument {
                name,
                description: None,
                required: false,
            })
            .collect()
    } else {
        front
            .arguments
            .into_iter()
            .map(|a| TemplateArgument {
                name: a.name,
                description: a.description,
                required: a.required,
            })
            .collect()
    };

    Ok(PromptTemplate {
        name,
        description: front.description.unwrap_or_default(),
        arguments,
        content: body.to_string(),
        scope: TemplateScope::Builtin,
        project_id: None,
    })
}

fn split_front_matter(raw: &str) -> CoreResult<(StaticFrontMatter, &str)> {
    if let Some(rest) = raw.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---\n") {
            let front: StaticFrontMatter = serde_yaml::from_str(&rest[..end])
                .map_err(|e| CoreError::Internal(anyhow::anyhow!("template front-matter: {}", e)))?;
            return Ok((front, &rest[end + 5..]));
        }
    }
    Ok((StaticFrontMatter::default(), raw))
}

fn filename_stem(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .strip_suffix(".prompt.md")
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
}

/// Unique `{{identifier}}` names, in order of first appearance.
pub fn discover_placeholders(body: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for captures in placeholder_re().captures_iter(body) {
        let name = captures[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Substitute arguments into a template body.
///
/// Required arguments missing from `args` fail `MissingArgument`; any
/// other placeholder with no provided value becomes the empty string so
/// optional placeholders disappear cleanly.
pub fn fill(template: &PromptTemplate, args: &HashMap<String, String>) -> CoreResult<FilledPrompt> {
    for argument in &template.arguments {
        if argument.required && !args.contains_key(&argument.name) {
            return Err(CoreError::MissingArgument(argument.name.clone()));
        }
    }

    let text = placeholder_re()
        .replace_all(&template.content, |captures: &regex::Captures<'_>| {
            args.get(&captures[1]).cloned().unwrap_or_default()
        })
        .into_owned();

    Ok(FilledPrompt {
        description: template.description.clone(),
        messages: vec![PromptMessage::user_text(text)],
    })
}
