//! Database connection listing through the MCP server.

use std::error::Error;

use rust_mcp_schema::CallToolResult;
use serde_json::{Map, Value};

use crate::core::config::Config;
use crate::mcp::McpClient;

pub const LIST_CONNECTIONS_TOOL: &str = "list_database_connections";

/// Connection names from the tool's structured `connections` list. Errors and
/// unstructured results yield nothing.
pub fn connection_names(result: &CallToolResult) -> Vec<String> {
    if result.is_error.unwrap_or(false) {
        return Vec::new();
    }
    result
        .structured_content
        .as_ref()
        .and_then(|content| content.get("connections"))
        .and_then(Value::as_array)
        .map(|connections| {
            connections
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub async fn list_connections(config: &Config) -> Result<(), Box<dyn Error>> {
    let client = McpClient::connect(config).await?;
    let result = client.call_tool(LIST_CONNECTIONS_TOOL, Map::new()).await?;
    let names = connection_names(&result);

    if names.is_empty() {
        println!("No database connections found.");
        return Ok(());
    }

    println!("🗄️  Database connections");
    println!();
    for name in names {
        println!("  • {name}");
    }
    Ok(())
}
