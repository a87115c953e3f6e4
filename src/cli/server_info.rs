//! Report of what the MCP server exposes.

use std::error::Error;

use serde_json::{json, Value};

use crate::core::config::Config;
use crate::mcp::{McpClient, ServerInventory};

/// Tools, resources and prompts as one JSON document. Resource templates
/// are listed among the resources with a `Template` mime type.
pub fn inventory_report(inventory: &ServerInventory) -> Result<Value, serde_json::Error> {
    let mut resources = inventory
        .resources
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    for template in &inventory.resource_templates {
        let template = serde_json::to_value(template)?;
        resources.push(json!({
            "uri": template.get("uriTemplate").cloned().unwrap_or(Value::Null),
            "name": template.get("name").cloned().unwrap_or(Value::Null),
            "description": template.get("description").cloned().unwrap_or(Value::Null),
            "mimeType": "Template",
        }));
    }

    Ok(json!({
        "server_info": serde_json::to_value(&inventory.server)?,
        "tools": serde_json::to_value(&inventory.tools)?,
        "resources": resources,
        "prompts": serde_json::to_value(&inventory.prompts)?,
    }))
}

pub async fn show_server_info(config: &Config) -> Result<(), Box<dyn Error>> {
    let client = McpClient::connect(config).await?;
    let inventory = client.server_inventory().await?;
    println!("{}", serde_json::to_string_pretty(&inventory_report(&inventory)?)?);
    Ok(())
}
