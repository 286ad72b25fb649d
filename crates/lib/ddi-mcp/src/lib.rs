//! MCP server implementation for ddi-mcp.
//!
//! This crate wires the control plane into rmcp tool handlers and exposes the
//! live handler catalog, handler invocation, and knowledge retrieval.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use ddi_core::control::DdiControlPlane;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use surrealdb::Connection;

const SERVER_INSTRUCTIONS: &str = r#"ddi-mcp exposes a DDI management API as a catalog of handlers compiled from the API's own schema.

Workflow:
1. Find the right handler:
   - `retrieve_knowledge` with the user's request (for example "networks where MARSHA is HDQTR2")
     returns ranked notes on resource types, fields, extensible attributes, and multi-step recipes.
   - `list_handlers` filters the catalog by `resource_type` and/or `operation`.
   - `describe_handler` returns a handler's input schema.
2. Call it with `invoke_handler` (`name` plus `arguments`). Set `dry_run` to see the REST request
   that would be sent without sending it.
3. Maintain the catalog:
   - `catalog_status` reports version, fingerprint, handler counts, and the last refresh outcome.
   - `refresh_catalog` re-discovers the schema; unchanged schemas keep the current catalog.
   - `rebuild_knowledge` regenerates the knowledge index from the live schema.

Notes:
- Handler names are `{Operation}:{resource_type}`, e.g. `List:network`, `Search:record:a`.
- Search filters prefixed with `*` target extensible attributes (`{"*Site": "HQ"}`); any such filter
  makes the response include `extattrs`.
- Filter keys take modifiers: `~` regex, `!` not equal, `:` case-insensitive, `<` / `>` comparisons.
- Object references (`_ref`) returned by list/search feed `ref` arguments of get/update/delete.
- Use `help` and `examples` for more guidance. `health` returns `ok`."#;

/// MCP server wrapper around the control plane and tool routers.
#[derive(Clone)]
pub struct DdiMcp<C: Connection> {
    tool_router: ToolRouter<Self>,
    control: Arc<DdiControlPlane<C>>,
}

impl<C: Connection> DdiMcp<C> {
    /// Creates a new server owning the control plane.
    #[must_use]
    pub fn new(control: DdiControlPlane<C>) -> Self {
        Self::with_control(Arc::new(control))
    }

    /// Creates a new server using a shared control plane.
    #[must_use]
    pub fn with_control(control: Arc<DdiControlPlane<C>>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_catalog()
            + Self::tool_router_knowledge()
            + Self::tool_router_context();
        Self {
            tool_router,
            control,
        }
    }

    pub(crate) fn control(&self) -> &DdiControlPlane<C> {
        &self.control
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl<C: Connection> DdiMcp<C> {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl<C: Connection> ServerHandler for DdiMcp<C> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
