//! MCP Server implementation
//!
//! Implements the MCP server that communicates over stdio using JSON-RPC 2.0.

use super::handlers::ToolHandler;
use super::protocol::*;
use super::tools::all_tools;
use crate::AppState;
use anyhow::Result;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "project-governor";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server that handles JSON-RPC 2.0 requests over stdio
pub struct McpServer {
    state: Arc<AppState>,
    tool_handler: ToolHandler,
    /// Subject of the bearer token this server was started with; recorded
    /// as the user on every write.
    user: String,
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server for one authenticated user
    pub fn new(state: Arc<AppState>, user: String) -> Self {
        let tool_handler = ToolHandler::new(state.clone(), user.clone());
        Self {
            state,
            tool_handler,
            user,
            initialized: false,
        }
    }

    /// Run the server, reading from stdin and writing to stdout
    pub async fn run(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let reader = BufReader::new(stdin.lock());
        let mut writer = stdout.lock();

        info!("MCP server starting on stdio");

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("Failed to read line: {}", e);
                    break;
                }
            };

            if line.is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            let response = self.handle_message(&line).await;

            if let Some(resp) = response {
                let json = serde_json::to_string(&resp)?;
                debug!("Sending: {}", json);
                writeln!(writer, "{}", json)?;
                writer.flush()?;
            }
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Handle a single JSON-RPC message
    async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::parse_error(e.to_string()),
                ));
            }
        };

        // Notifications have no ID and get no response
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                self.handle_notification(&request).await;
                return None;
            }
        };

        let result = self.handle_request(&request).await;

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    /// Handle a notification (no response expected)
    async fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                info!("Client confirmed initialization");
            }
            "notifications/cancelled" => {
                warn!("Request cancelled by client");
            }
            _ => {
                debug!("Unknown notification: {}", request.method);
            }
        }
    }

    /// Handle a request and return the result or error
    async fn handle_request(&mut self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(&request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&request.params).await,
            "prompts/list" => self.handle_prompts_list(&request.params).await,
            "prompts/get" => self.handle_prompts_get(&request.params).await,
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&mut self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?
            .unwrap_or(InitializeParams {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ClientCapabilities::default(),
                client_info: None,
            });

        info!(
            "Initializing MCP server (client protocol: {}, user: {})",
            params.protocol_version, self.user
        );

        if let Some(ref client) = params.client_info {
            info!(
                "Client: {} v{}",
                client.name,
                client.version.as_deref().unwrap_or("unknown")
            );
        }

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
                prompts: PromptsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Handle tools/list request
    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        if !self.initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        let tools = all_tools();
        let result = ToolsListResult { tools };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Handle tools/call request
    async fn handle_tools_call(&self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        if !self.initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        let params: ToolCallParams = params
            .as_ref()
            .ok_or_else(|| JsonRpcError::invalid_params("params required"))
            .and_then(|p| {
                serde_json::from_value(p.clone())
                    .map_err(|e| JsonRpcError::invalid_params(e.to_string()))
            })?;

        info!("Tool call: {}", params.name);
        debug!("Arguments: {:?}", params.arguments);

        let result = self
            .tool_handler
            .handle(&params.name, params.arguments)
            .await;

        let tool_result = match result {
            Ok(value) => {
                ToolCallResult::success(serde_json::to_string_pretty(&value).unwrap_or_default())
            }
            Err(e) => {
                error!("Tool error: {}", e);
                ToolCallResult::error(e.to_string())
            }
        };

        serde_json::to_value(tool_result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Handle prompts/list request
    async fn handle_prompts_list(&self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        if !self.initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        let params: PromptsListParams = params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?
            .unwrap_or_default();

        let templates = self
            .state
            .prompts
            .get_user_prompts(&self.user, params.project_id.as_deref(), None)
            .await
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;

        let result = PromptsListResult {
            prompts: templates
                .into_iter()
                .map(|t| PromptInfo {
                    name: t.name,
                    description: t.description,
                    arguments: t
                        .arguments
                        .into_iter()
                        .map(|a| PromptArgumentInfo {
                            name: a.name,
                            description: a.description,
                            required: a.required,
                        })
                        .collect(),
                })
                .collect(),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Handle prompts/get request
    async fn handle_prompts_get(&self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        if !self.initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        let params: PromptsGetParams = params
            .as_ref()
            .ok_or_else(|| JsonRpcError::invalid_params("params required"))
            .and_then(|p| {
                serde_json::from_value(p.clone())
                    .map_err(|e| JsonRpcError::invalid_params(e.to_string()))
            })?;

        let args = params.arguments.unwrap_or_default();
        let filled = self
            .state
            .prompts
            .get_prompt(&params.name, &args, &self.user, params.project_id.as_deref())
            .await
            .map_err(|e| match e {
                crate::error::CoreError::TemplateNotFound(_)
                | crate::error::CoreError::MissingArgument(_) => {
                    JsonRpcError::invalid_params(e.to_string())
                }
                other => JsonRpcError::internal_error(other.to_string()),
            })?;

        serde_json::to_value(filled).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_initialize_request() {
        let request = r#"{"jsonrpc":"2.0","method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"claude-code","version":"1.0"}},"id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(request).unwrap();
        assert_eq!(req.method, "initialize");
        assert!(req.params.is_some());
    }

    #[test]
    fn test_parse_prompts_get_request() {
        let request = r#"{"jsonrpc":"2.0","method":"prompts/get","params":{"name":"review","arguments":{"file":"a.rs"}},"id":2}"#;
        let req: JsonRpcRequest = serde_json::from_str(request).unwrap();
        let params: PromptsGetParams = serde_json::from_value(req.params.unwrap()).unwrap();
        assert_eq!(params.name, "review");
        assert_eq!(
            params.arguments.unwrap().get("file").map(String::as_str),
            Some("a.rs")
        );
    }

    #[test]
    fn test_parse_tools_call_request() {
        let request = r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"export_document","arguments":{"scope":"project","project_id":"p1","slot":"feature_list"}},"id":3}"#;
        let req: JsonRpcRequest = serde_json::from_str(request).unwrap();
        assert_eq!(req.method, "tools/call");

        let params: ToolCallParams = serde_json::from_value(req.params.unwrap()).unwrap();
        assert_eq!(params.name, "export_document");
    }

    #[test]
    fn test_error_response() {
        let resp = JsonRpcResponse::error(
            Value::Number(1.into()),
            JsonRpcError::method_not_found("unknown"),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("-32601"));
    }
}
