//! MCP server handler implementation.
//!
//! Routes tool calls to the implementations in [`crate::tools`], all sharing
//! one [`AppState`].
use std::sync::Arc;

use crate::state::AppState;
use crate::tools::cache::{CacheGetParams, get_impl};
use crate::tools::fetch::{FetchParams, fetch_impl};
use crate::tools::generation::{ActivateParams, InstallParams, activate_impl, install_impl, list_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for offcache.
#[derive(Clone)]
pub struct OffcacheServer {
    tool_router: ToolRouter<Self>,
    state: Arc<AppState>,
}

#[tool_router]
impl OffcacheServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { tool_router: Self::tool_router(), state }
    }

    /// Fetch a URL through the interception cache.
    #[tool(
        description = "Fetch a URL through the offline cache. Relative paths resolve against the configured origin. Reports the route class and whether the response came from the network, the cache, or an offline fallback."
    )]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.state, params.0).await
    }

    /// Read a stored entry from the active generation.
    #[tool(description = "Look up the stored response for a URL in the active generation. Never contacts the network.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.state, params.0).await
    }

    /// Install a generation from the configured manifest.
    #[tool(
        description = "Install a cache generation by fetching every manifest asset. All-or-nothing: on any failure nothing is stored. Optionally activates it."
    )]
    async fn generation_install(&self, params: Parameters<InstallParams>) -> Result<CallToolResult, McpError> {
        install_impl(&self.state, params.0).await
    }

    /// Activate a waiting generation.
    #[tool(
        description = "Activate a waiting generation. The previous active generation is superseded and deleted once in-flight reads finish."
    )]
    async fn generation_activate(&self, params: Parameters<ActivateParams>) -> Result<CallToolResult, McpError> {
        activate_impl(&self.state, params.0).await
    }

    /// List generations.
    #[tool(description = "List cache generations with their lifecycle state and entry counts.")]
    async fn generation_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.state).await
    }
}

impl ServerHandler for OffcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
