//! Prompt template models.

use serde::{Deserialize, Serialize};

/// Layer a template was resolved from. Resolution order is
/// builtin → global → user → project, first name wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateScope {
    Builtin,
    Global,
    User,
    Project,
}

/// A declared or discovered template argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A prompt template with its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<TemplateArgument>,
    pub content: String,
    pub scope: TemplateScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// List-view of a template (no body), as returned by `get_user_prompts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    pub description: String,
    pub arguments: Vec<TemplateArgument>,
    pub scope: TemplateScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl From<&PromptTemplate> for TemplateMetadata {
    fn from(template: &PromptTemplate) -> Self {
        Self {
            name: template.name.clone(),
            description: template.description.clone(),
            arguments: template.arguments.clone(),
            scope: template.scope,
            project_id: template.project_id.clone(),
        }
    }
}

/// A template with its placeholders substituted, in MCP message shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilledPrompt {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: PromptMessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessageContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl PromptMessage {
    pub fn user_text(text: String) -> Self {
        Self {
            role: "user".to_string(),
            content: PromptMessageContent {
                content_type: "text".to_string(),
                text,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_serialization() {
        assert_eq!(
            serde_json::to_string(&TemplateScope::Global).unwrap(),
            "\"global\""
        );
        assert_eq!(
            serde_json::to_string(&TemplateScope::Project).unwrap(),
            "\"project\""
        );
    }

    #[test]
    fn test_dynamic_template_json_shape() {
        let json = r#"{
            "name": "review",
            "description": "Code review prompt",
            "arguments": [{"name": "file", "required": true}],
            "content": "Review {{file}} carefully.",
            "scope": "global"
        }"#;
        let template: PromptTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.name, "review");
        assert_eq!(template.arguments.len(), 1);
        assert!(template.arguments[0].required);
        assert!(template.arguments[0].description.is_none());
    }

    #[test]
    fn test_message_shape() {
        let message = PromptMessage::user_text("hello".into());
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"]["type"], "text");
        assert_eq!(json["content"]["text"], "hello");
    }
}
