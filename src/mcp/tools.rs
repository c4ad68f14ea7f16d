//! MCP Tool definitions
//!
//! Tools mirror the REST operations 1:1 (same parameters, same errors).

use super::protocol::{InputSchema, ToolDefinition};
use serde_json::json;

fn scope_properties() -> serde_json::Value {
    json!({
        "scope": {"type": "string", "description": "project, task, or meeting"},
        "project_id": {"type": "string", "description": "Project ID (project and task scope)"},
        "task_id": {"type": "string", "description": "Task ID (task scope)"},
        "meeting_id": {"type": "string", "description": "Meeting ID (meeting scope)"},
        "slot": {"type": "string", "description": "Document slot, e.g. feature_list, design, polish"}
    })
}

fn with_scope(extra: serde_json::Value) -> serde_json::Value {
    let mut properties = scope_properties();
    if let (Some(base), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    properties
}

fn scoped_tool(name: &str, description: &str, extra: serde_json::Value, mut required: Vec<&str>) -> ToolDefinition {
    let mut all_required = vec!["scope".to_string(), "slot".to_string()];
    all_required.extend(required.drain(..).map(String::from));
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: InputSchema {
            schema_type: "object".to_string(),
            properties: Some(with_scope(extra)),
            required: Some(all_required),
        },
    }
}

/// Generate all tool definitions
pub fn all_tools() -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    tools.extend(document_tools());
    tools.extend(section_tools());
    tools.extend(plan_tools());
    tools.extend(audio_tools());
    tools
}

// ============================================================================
// Document Tools (4)
// ============================================================================

fn document_tools() -> Vec<ToolDefinition> {
    vec![
        scoped_tool(
            "export_document",
            "Export the compiled content of a document slot",
            json!({}),
            vec![],
        ),
        scoped_tool(
            "append_document",
            "Append content to a document slot (or replace the whole document)",
            json!({
                "content": {"type": "string", "description": "Content to write"},
                "op": {"type": "string", "description": "append (default) or replace"},
                "expected_version": {"type": "integer", "description": "Optimistic lock version"}
            }),
            vec!["content"],
        ),
        scoped_tool(
            "list_chunks",
            "List the chunk log of a document slot, including inactive audit records",
            json!({}),
            vec![],
        ),
        scoped_tool(
            "squash_document",
            "Collapse a document's chunk log into one active chunk (keeps the compiled view)",
            json!({}),
            vec![],
        ),
    ]
}

// ============================================================================
// Section Tools (6)
// ============================================================================

fn section_tools() -> Vec<ToolDefinition> {
    vec![
        scoped_tool(
            "get_sections",
            "List the Markdown sections of a document",
            json!({}),
            vec![],
        ),
        scoped_tool(
            "get_section",
            "Get one section's content by id",
            json!({
                "section_id": {"type": "string", "description": "Section id (sec-...)"},
                "include_children": {"type": "boolean", "description": "Include subsection content"}
            }),
            vec!["section_id"],
        ),
        scoped_tool(
            "update_section",
            "Replace a section's body (heading stays)",
            json!({
                "section_id": {"type": "string", "description": "Section id"},
                "content": {"type": "string", "description": "New section body"},
                "expected_version": {"type": "integer", "description": "Optimistic lock version"}
            }),
            vec!["section_id", "content"],
        ),
        scoped_tool(
            "insert_section",
            "Insert a new section after another section or at the end of the document",
            json!({
                "title": {"type": "string", "description": "Heading title"},
                "content": {"type": "string", "description": "Section body"},
                "after_section_id": {"type": "string", "description": "Sibling to insert after (omit to append at root)"},
                "expected_version": {"type": "integer", "description": "Optimistic lock version"}
            }),
            vec!["title", "content"],
        ),
        scoped_tool(
            "delete_section",
            "Delete a section; cascade to delete its subtree",
            json!({
                "section_id": {"type": "string", "description": "Section id"},
                "cascade": {"type": "boolean", "description": "Delete subsections too"},
                "expected_version": {"type": "integer", "description": "Optimistic lock version"}
            }),
            vec!["section_id"],
        ),
        scoped_tool(
            "sync_sections",
            "Synchronise compiled.md and per-section files",
            json!({
                "direction": {"type": "string", "description": "from_compiled or to_compiled"}
            }),
            vec!["direction"],
        ),
    ]
}

// ============================================================================
// Plan Tools (4)
// ============================================================================

fn plan_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_execution_plan".to_string(),
            description: "Get a task's execution plan (front-matter, steps, version)".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "project_id": {"type": "string", "description": "Project ID"},
                    "task_id": {"type": "string", "description": "Task ID"}
                })),
                required: Some(vec!["project_id".to_string(), "task_id".to_string()]),
            },
        },
        ToolDefinition {
            name: "save_execution_plan".to_string(),
            description: "Save a task's execution plan from its full Markdown form".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "project_id": {"type": "string", "description": "Project ID"},
                    "task_id": {"type": "string", "description": "Task ID"},
                    "content": {"type": "string", "description": "Plan document (front-matter + steps)"},
                    "expected_version": {"type": "integer", "description": "Optimistic lock version"}
                })),
                required: Some(vec![
                    "project_id".to_string(),
                    "task_id".to_string(),
                    "content".to_string(),
                ]),
            },
        },
        ToolDefinition {
            name: "get_next_step".to_string(),
            description: "Compute the next executable step of a task's plan".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "project_id": {"type": "string", "description": "Project ID"},
                    "task_id": {"type": "string", "description": "Task ID"}
                })),
                required: Some(vec!["project_id".to_string(), "task_id".to_string()]),
            },
        },
        ToolDefinition {
            name: "update_step_status".to_string(),
            description: "Apply a status transition to one plan step".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "project_id": {"type": "string", "description": "Project ID"},
                    "task_id": {"type": "string", "description": "Task ID"},
                    "step_id": {"type": "string", "description": "Step id (step-NN)"},
                    "status": {"type": "string", "description": "pending, in-progress, succeeded, failed, cancelled"},
                    "output": {"type": "string", "description": "Optional execution output"}
                })),
                required: Some(vec![
                    "project_id".to_string(),
                    "task_id".to_string(),
                    "step_id".to_string(),
                    "status".to_string(),
                ]),
            },
        },
    ]
}

// ============================================================================
// Audio Tools (2)
// ============================================================================

fn audio_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "transcribe_meeting".to_string(),
            description: "Transcribe a server-local audio file and append the transcript to the meeting's polish document".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "meeting_id": {"type": "string", "description": "Meeting ID"},
                    "wav_path": {"type": "string", "description": "Path to the audio file on the server"},
                    "model": {"type": "string", "description": "Model name (default base)"},
                    "language": {"type": "string", "description": "Language hint"}
                })),
                required: Some(vec!["meeting_id".to_string(), "wav_path".to_string()]),
            },
        },
        ToolDefinition {
            name: "get_audio_health".to_string(),
            description: "Get the health status of the transcriber chain".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({})),
                required: None,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tools_have_unique_names() {
        let tools = all_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
        assert_eq!(before, 16);
    }

    #[test]
    fn test_scoped_tools_require_scope_and_slot() {
        let tools = all_tools();
        let export = tools.iter().find(|t| t.name == "export_document").unwrap();
        let required = export.input_schema.required.as_ref().unwrap();
        assert!(required.contains(&"scope".to_string()));
        assert!(required.contains(&"slot".to_string()));
    }

    #[test]
    fn test_definitions_serialize_with_camel_case_schema_key() {
        let tools = all_tools();
        let value = serde_json::to_value(&tools[0]).unwrap();
        assert!(value.get("inputSchema").is_some());
    }
}
