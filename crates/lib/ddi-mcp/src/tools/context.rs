use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use surrealdb::Connection;

use crate::DdiMcp;

/// Payload listing the MCP commands.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpCommands {
    pub commands: Vec<String>,
}

impl Default for HelpCommands {
    fn default() -> Self {
        Self {
            commands: vec![
                "help - List MCP commands and what they do.".to_string(),
                "examples - Worked requests showing filters, attributes, and chained handlers."
                    .to_string(),
                "list_handlers - List catalog handlers, filtered by resource_type and operation."
                    .to_string(),
                "describe_handler - Fetch a handler's input schema and binding.".to_string(),
                "invoke_handler - Call a handler with JSON arguments; dry_run previews the request."
                    .to_string(),
                "catalog_status - Catalog version, fingerprint, counts, and last refresh outcome."
                    .to_string(),
                "refresh_catalog - Re-discover the remote schema and recompile on drift."
                    .to_string(),
                "retrieve_knowledge - Ranked notes for choosing handlers and parameters."
                    .to_string(),
                "rebuild_knowledge - Regenerate the knowledge index from the live schema."
                    .to_string(),
                "health - Returns ok.".to_string(),
            ],
        }
    }
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl<C: Connection> DdiMcp<C> {
    #[tool(description = "List the MCP commands and what they do.")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(HelpCommands::default())?]))
    }

    #[tool(description = "Worked examples of handler invocations, including attribute filters and multi-step chains.")]
    async fn examples(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text(
r#"
List networks, 50 at most, returning two fields:
  invoke_handler {"name": "List:network", "arguments": {"limit": 50, "projection": ["network", "comment"]}}

Networks whose extensible attribute MARSHA is HDQTR2 (extattrs is returned automatically):
  invoke_handler {"name": "Search:network", "arguments": {"filters": {"*MARSHA": "HDQTR2"}}}

A records whose name matches a regex, case-insensitively:
  invoke_handler {"name": "Search:record:a", "arguments": {"filters": {"name~:": "^web"}}}

Preview a request without sending it:
  invoke_handler {"name": "Search:network", "arguments": {"filters": {"network": "10.0.0.0/8"}}, "dry_run": true}

Chain: find a network, then update its comment.
  1. invoke_handler {"name": "Search:network", "arguments": {"filters": {"network": "10.1.0.0/16"}}}
  2. take `_ref` from the result
  3. invoke_handler {"name": "Update:network", "arguments": {"ref": "<_ref>", "payload": {"comment": "core"}}}

Chain: host records for a site.
  1. invoke_handler {"name": "Search:network", "arguments": {"filters": {"*Site": "HQ"}}}
  2. for each returned network, invoke_handler {"name": "Search:record:host", "arguments": {"filters": {"ipv4addr": "<network>"}}}
"#,
        )]))
    }
}
