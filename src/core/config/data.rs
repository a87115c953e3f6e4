use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An OpenAI-compatible endpoint the chat loop can talk to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub default_model: String,
    /// Literal key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Name of the environment variable holding the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Always use `default_model`, ignoring a model named by the caller.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fixed_model: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct McpServerConfig {
    /// Streamable HTTP endpoint of the tool server.
    pub base_url: Option<String>,
    /// Protocol version requested during initialize; latest known when unset.
    pub protocol_version: Option<String>,
    /// Bearer token sent with every MCP request.
    pub auth_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Provider used when a turn does not name one (e.g., "openai", "ollama")
    pub default_provider: Option<String>,
    /// Provider endpoints keyed by lowercase id. Merged over the built-ins.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub mcp: McpServerConfig,
    /// Tools that receive the selected backing resource as an argument
    pub context_tools: Option<Vec<String>>,
    /// Argument name the selected backing resource is injected under
    pub resource_argument: Option<String>,
    pub tool_timeout_seconds: Option<u64>,
    /// Upper bound on tool dispatch rounds within one turn
    pub max_tool_rounds: Option<usize>,
    pub system_prompt: Option<String>,
}

/// Get a user-friendly display string for a path, using `~` for the home
/// directory on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
