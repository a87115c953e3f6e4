pub mod client;
pub mod transport;

use async_trait::async_trait;
use rust_mcp_schema::{CallToolResult, Tool};
use serde_json::{Map, Value};

use crate::api::ChatToolDefinition;

pub use client::{McpClient, ServerInventory};

/// The tool-execution side of a chat session.
#[async_trait]
pub trait ToolService: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<Tool>, String>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String>;
}

/// Advertises MCP tools to the model as function tools.
pub fn tool_definitions(tools: &[Tool]) -> Vec<ChatToolDefinition> {
    tools
        .iter()
        .map(|tool| {
            let parameters = serde_json::to_value(&tool.input_schema).unwrap_or_else(|err| {
                tracing::warn!(tool = %tool.name, error = %err, "Unserializable tool schema");
                serde_json::json!({"type": "object", "properties": {}})
            });
            ChatToolDefinition::function(
                tool.name.clone(),
                tool.description.clone().unwrap_or_default(),
                parameters,
            )
        })
        .collect()
}
