use crate::core::config::data::{Config, McpServerConfig};
use crate::mcp::transport::{list_fetch_from_response, ListFetch};
use crate::mcp::ToolService;
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, Implementation,
    InitializeRequestParams, InitializeResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, Prompt, Resource,
    ResourceTemplate, ServerCapabilities, Tool,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

mod protocol;
mod transport_http;

const MCP_MAX_TOOL_LIST: usize = 100;
const MCP_JSON_CONTENT_TYPE: &str = "application/json";
const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const MCP_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const MCP_HTTP_REQUEST_TIMEOUT_SECONDS: u64 = 300;
const MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;
const MCP_HTTP_POOL_MAX_IDLE_PER_HOST: usize = 8;

fn build_mcp_http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(MCP_HTTP_CONNECT_TIMEOUT_SECONDS))
        .timeout(Duration::from_secs(MCP_HTTP_REQUEST_TIMEOUT_SECONDS))
        .pool_idle_timeout(Duration::from_secs(MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS))
        .pool_max_idle_per_host(MCP_HTTP_POOL_MAX_IDLE_PER_HOST)
        .build()
        .map_err(|err| err.to_string())
}

fn apply_streamable_http_client_post_headers(
    request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    request
        .header("Content-Type", MCP_JSON_CONTENT_TYPE)
        .header("Accept", MCP_JSON_AND_SSE_ACCEPT)
}

fn apply_streamable_http_protocol_version_header(
    request: reqwest::RequestBuilder,
    protocol_version: Option<&str>,
) -> reqwest::RequestBuilder {
    match protocol_version {
        Some(protocol_version) if !protocol_version.trim().is_empty() => {
            request.header(MCP_PROTOCOL_VERSION_HEADER, protocol_version)
        }
        _ => request,
    }
}

/// Per-connection protocol state learned from the server.
#[derive(Clone, Debug, Default)]
struct SessionState {
    session_id: Option<String>,
    negotiated_protocol_version: Option<String>,
    server_details: Option<InitializeResult>,
}

/// MCP client for a single tool server over streamable HTTP.
///
/// Calls take `&self` so a dispatch batch can run them concurrently; the
/// session id and negotiated version live behind a lock and are refreshed
/// from every response.
pub struct McpClient {
    config: McpServerConfig,
    base_url: String,
    http_client: reqwest::Client,
    auth_header: Option<String>,
    session: RwLock<SessionState>,
    next_request_id: AtomicI64,
}

impl McpClient {
    /// Builds a client for the configured server and performs the
    /// initialize handshake.
    pub async fn connect(config: &Config) -> Result<Self, String> {
        let http_client = build_mcp_http_client()
            .map_err(|err| format!("Failed to build HTTP client: {err}"))?;
        let client = Self::with_http_client(config.mcp.clone(), config.mcp_base_url(), http_client);
        client.initialize().await?;
        Ok(client)
    }

    pub fn with_http_client(
        config: McpServerConfig,
        base_url: String,
        http_client: reqwest::Client,
    ) -> Self {
        let auth_header = config
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {token}"));
        Self {
            config,
            base_url,
            http_client,
            auth_header,
            session: RwLock::new(SessionState::default()),
            next_request_id: AtomicI64::new(0),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn server_details(&self) -> Option<InitializeResult> {
        self.session.read().await.server_details.clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session.read().await.session_id.clone()
    }

    fn next_request_id(&self) -> i64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.session
            .read()
            .await
            .server_details
            .as_ref()
            .map(|details| details.capabilities.clone())
    }

    async fn supports_tools(&self) -> bool {
        self.server_capabilities()
            .await
            .map(|caps| caps.tools.is_some())
            .unwrap_or(true)
    }

    async fn supports_resources(&self) -> bool {
        self.server_capabilities()
            .await
            .map(|caps| caps.resources.is_some())
            .unwrap_or(true)
    }

    async fn supports_prompts(&self) -> bool {
        self.server_capabilities()
            .await
            .map(|caps| caps.prompts.is_some())
            .unwrap_or(true)
    }

    /// Every tool the server offers, following pagination up to a fixed cap.
    pub async fn list_tools(&self) -> Result<ListToolsResult, String> {
        if !self.supports_tools().await {
            return Ok(empty_list_tools());
        }
        let result = collect_tool_pages(|cursor| self.fetch_tools_page(cursor)).await?;
        tracing::debug!(
            server = %self.base_url,
            tools = result.tools.len(),
            truncated = result.next_cursor.is_some(),
            "Listed MCP tools"
        );
        Ok(result)
    }

    async fn fetch_tools_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Option<ListToolsResult>, String> {
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(paginated_params(cursor)))
            .await;
        match list_fetch_from_response(response, protocol::parse_list_tools) {
            ListFetch::Ok(list) => Ok(Some(list)),
            ListFetch::MethodNotFound => Ok(None),
            ListFetch::Err(message) => Err(message),
        }
    }

    pub async fn list_resources(&self) -> Result<ListResourcesResult, String> {
        if !self.supports_resources().await {
            return Ok(empty_list_resources());
        }
        let response = self
            .send_request(RequestFromClient::ListResourcesRequest(None))
            .await;
        match list_fetch_from_response(response, protocol::parse_list_resources) {
            ListFetch::Ok(list) => Ok(list),
            ListFetch::MethodNotFound => Ok(empty_list_resources()),
            ListFetch::Err(message) => Err(format!("Resources listing failed: {message}")),
        }
    }

    pub async fn list_resource_templates(&self) -> Result<ListResourceTemplatesResult, String> {
        if !self.supports_resources().await {
            return Ok(empty_list_resource_templates());
        }
        let response = self
            .send_request(RequestFromClient::ListResourceTemplatesRequest(None))
            .await;
        match list_fetch_from_response(response, protocol::parse_list_resource_templates) {
            ListFetch::Ok(list) => Ok(list),
            ListFetch::MethodNotFound => Ok(empty_list_resource_templates()),
            ListFetch::Err(message) => {
                Err(format!("Resource templates listing failed: {message}"))
            }
        }
    }

    pub async fn list_prompts(&self) -> Result<ListPromptsResult, String> {
        if !self.supports_prompts().await {
            return Ok(empty_list_prompts());
        }
        let response = self
            .send_request(RequestFromClient::ListPromptsRequest(None))
            .await;
        match list_fetch_from_response(response, protocol::parse_list_prompts) {
            ListFetch::Ok(list) => Ok(list),
            ListFetch::MethodNotFound => Ok(empty_list_prompts()),
            ListFetch::Err(message) => Err(format!("Prompts listing failed: {message}")),
        }
    }

    /// Tools, resources, templates and prompts in one report.
    pub async fn server_inventory(&self) -> Result<ServerInventory, String> {
        let (tools, resources, resource_templates, prompts) = tokio::try_join!(
            self.list_tools(),
            self.list_resources(),
            self.list_resource_templates(),
            self.list_prompts()
        )?;
        Ok(ServerInventory {
            server: self.server_details().await,
            tools: tools.tools,
            resources: resources.resources,
            resource_templates: resource_templates.resource_templates,
            prompts: prompts.prompts,
        })
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String> {
        tracing::debug!(tool = %name, "Calling MCP tool");
        let params = CallToolRequestParams::new(name).with_arguments(arguments);
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        protocol::parse_call_tool(response)
    }
}

#[async_trait]
impl ToolService for McpClient {
    async fn list_tools(&self) -> Result<Vec<Tool>, String> {
        McpClient::list_tools(self).await.map(|list| list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String> {
        McpClient::call_tool(self, name, arguments).await
    }
}

/// Snapshot of what a server exposes.
#[derive(Clone, Debug)]
pub struct ServerInventory {
    pub server: Option<InitializeResult>,
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub resource_templates: Vec<ResourceTemplate>,
    pub prompts: Vec<Prompt>,
}

/// Follows `next_cursor` until the server stops paginating or the cap is
/// reached. The cursor of the first unread page is kept on truncation.
async fn collect_tool_pages<F, Fut>(mut fetch: F) -> Result<ListToolsResult, String>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Option<ListToolsResult>, String>>,
{
    let Some(mut list) = fetch(None).await? else {
        return Ok(empty_list_tools());
    };
    let meta = list.meta.take();
    let mut tools = std::mem::take(&mut list.tools);
    let mut next_cursor = list.next_cursor.take();

    if tools.len() >= MCP_MAX_TOOL_LIST {
        tools.truncate(MCP_MAX_TOOL_LIST);
    } else {
        while let Some(cursor) = next_cursor.clone() {
            match fetch(Some(cursor)).await? {
                Some(next_list) => {
                    tools.extend(next_list.tools);
                    next_cursor = next_list.next_cursor;
                    if tools.len() >= MCP_MAX_TOOL_LIST {
                        tools.truncate(MCP_MAX_TOOL_LIST);
                        break;
                    }
                }
                None => {
                    next_cursor = None;
                }
            }
        }
    }

    Ok(ListToolsResult {
        meta,
        next_cursor,
        tools,
    })
}

fn client_details_for(config: &McpServerConfig) -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "mcpchat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("mcpchat".to_string()),
            description: Some("Terminal chat client for MCP tool servers".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: protocol::requested_protocol_version(config),
    }
}

fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

fn empty_list_tools() -> ListToolsResult {
    ListToolsResult {
        meta: None,
        next_cursor: None,
        tools: Vec::new(),
    }
}

fn empty_list_resources() -> ListResourcesResult {
    ListResourcesResult {
        meta: None,
        next_cursor: None,
        resources: Vec::new(),
    }
}

fn empty_list_resource_templates() -> ListResourceTemplatesResult {
    ListResourceTemplatesResult {
        meta: None,
        next_cursor: None,
        resource_templates: Vec::new(),
    }
}

fn empty_list_prompts() -> ListPromptsResult {
    ListPromptsResult {
        meta: None,
        next_cursor: None,
        prompts: Vec::new(),
    }
}
