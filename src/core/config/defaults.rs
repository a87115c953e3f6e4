use crate::core::config::data::{Config, ProviderConfig};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://host.docker.internal:11434/v1";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:latest";
pub const DEFAULT_MCP_SERVER_URL: &str = "http://127.0.0.1:8001/mcp";
pub const DEFAULT_RESOURCE_ARGUMENT: &str = "db_connection_name";
pub const DEFAULT_TOOL_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;

pub const DEFAULT_CONTEXT_TOOLS: [&str; 4] = [
    "list_tables",
    "get_table_schema",
    "run_sql_query",
    "find_documents",
];

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert data analyst assistant. Your primary goal is to answer questions by querying a database.

You have access to different database connections, which can be either SQL or MongoDB. You MUST adapt your strategy based on the tools available and their descriptions.

**Your procedure for EVERY database question is:**
1.  **Discover Structure**: Use `list_tables()` to see available tables/collections. Then, for each relevant one, use `get_table_schema()` to understand its fields.
2.  **Choose the Right Tool**:
    -   If you need to query a relational (SQL) database, you MUST use the `run_sql_query` tool.
    -   If you need to query a document (MongoDB) database, you MUST use the `find_documents` tool with a valid JSON filter.
3.  **Construct & Execute**: Based on the schema, construct a precise query (either SQL or a MongoDB filter) and execute it with the correct tool. DO NOT guess column or field names.
4.  **Synthesize Answer**: Use the data returned from the tool to formulate a complete, natural-language answer for the user.

For any non-database questions, you must answer directly without using any tools.";

pub fn builtin_providers() -> BTreeMap<String, ProviderConfig> {
    BTreeMap::from([
        (
            "openai".to_string(),
            ProviderConfig {
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                default_model: DEFAULT_OPENAI_MODEL.to_string(),
                api_key: None,
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                fixed_model: true,
            },
        ),
        (
            "ollama".to_string(),
            ProviderConfig {
                base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
                default_model: DEFAULT_OLLAMA_MODEL.to_string(),
                api_key: Some("ollama".to_string()),
                api_key_env: None,
                fixed_model: false,
            },
        ),
    ])
}

impl Config {
    pub fn default_provider(&self) -> String {
        self.default_provider
            .as_deref()
            .map(str::trim)
            .filter(|provider| !provider.is_empty())
            .unwrap_or(DEFAULT_PROVIDER)
            .to_ascii_lowercase()
    }

    /// Built-in providers with configured entries layered on top.
    pub fn effective_providers(&self) -> BTreeMap<String, ProviderConfig> {
        let mut providers = builtin_providers();
        for (id, provider) in &self.providers {
            providers.insert(id.to_ascii_lowercase(), provider.clone());
        }
        providers
    }

    pub fn mcp_base_url(&self) -> String {
        self.mcp
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.to_string())
    }

    pub fn context_tools(&self) -> Vec<String> {
        match &self.context_tools {
            Some(tools) => tools.clone(),
            None => DEFAULT_CONTEXT_TOOLS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn resource_argument(&self) -> String {
        self.resource_argument
            .clone()
            .unwrap_or_else(|| DEFAULT_RESOURCE_ARGUMENT.to_string())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(
            self.tool_timeout_seconds
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECONDS),
        )
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
            .filter(|rounds| *rounds > 0)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Applies the environment variables the server deployment is driven by:
    /// `OPENAI_MODEL`, `OLLAMA_BASE_URL` and `MCP_SERVER_URL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let builtins = builtin_providers();

        if let Some(model) = non_empty("OPENAI_MODEL") {
            let entry = self
                .providers
                .entry("openai".to_string())
                .or_insert_with(|| builtins["openai"].clone());
            entry.default_model = model;
        }
        if let Some(base_url) = non_empty("OLLAMA_BASE_URL") {
            let entry = self
                .providers
                .entry("ollama".to_string())
                .or_insert_with(|| builtins["ollama"].clone());
            entry.base_url = base_url;
        }
        if let Some(url) = non_empty("MCP_SERVER_URL") {
            self.mcp.base_url = Some(url);
        }
    }
}
