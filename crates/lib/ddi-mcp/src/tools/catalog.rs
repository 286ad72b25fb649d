use ddi_store::models::{HandlerDefinition, HandlerOrigin, OperationKind};
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::Connection;

use crate::{DdiMcp, helpers};

/// Parameters for listing handlers in the live catalog.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListHandlersParams {
    pub resource_type: Option<String>,
    /// One of List, Get, Create, Update, Delete, Search.
    pub operation: Option<String>,
}

/// Parameters for fetching a handler by name.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DescribeHandlerParams {
    pub name: String,
}

/// Parameters for invoking a handler.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InvokeHandlerParams {
    pub name: String,
    pub arguments: Option<Value>,
    /// Return the translated REST request instead of sending it.
    pub dry_run: Option<bool>,
}

/// Parameters for refreshing the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RefreshCatalogParams {
    /// Also rebuild the knowledge index after a successful refresh.
    pub rebuild_knowledge: Option<bool>,
}

/// Compact handler listing entry.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HandlerSummary {
    pub name: String,
    pub description: String,
    pub origin: String,
    pub resource_type: Option<String>,
    pub operation: Option<String>,
}

impl From<&HandlerDefinition> for HandlerSummary {
    fn from(handler: &HandlerDefinition) -> Self {
        Self {
            name: handler.name.clone(),
            description: handler.description.clone(),
            origin: match handler.origin {
                HandlerOrigin::Compiled => "compiled",
                HandlerOrigin::Custom => "custom",
            }
            .to_string(),
            resource_type: handler.resource_type().map(str::to_string),
            operation: handler.operation_kind().map(|kind| kind.as_str().to_string()),
        }
    }
}

#[tool_router(router = tool_router_catalog, vis = "pub")]
impl<C: Connection> DdiMcp<C> {
    #[tool(description = "List handlers in the live catalog, optionally filtered by resource_type and operation.")]
    async fn list_handlers(
        &self,
        Parameters(params): Parameters<ListHandlersParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let kind = normalize(params.operation)
            .map(|operation| operation.parse::<OperationKind>())
            .transpose()
            .map_err(|message| helpers::mcp_err(ErrorCode::INVALID_PARAMS, message))?;
        let resource_type = normalize(params.resource_type);
        let handlers: Vec<HandlerSummary> = self
            .control()
            .list_handlers(resource_type.as_deref(), kind)
            .await
            .iter()
            .map(HandlerSummary::from)
            .collect();
        Ok(CallToolResult::success(vec![Content::json(handlers)?]))
    }

    #[tool(description = "Fetch a handler's full definition, including its input schema and binding.")]
    async fn describe_handler(
        &self,
        Parameters(params): Parameters<DescribeHandlerParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let handler = self
            .control()
            .describe_handler(params.name.trim())
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(handler)?]))
    }

    #[tool(description = "Invoke a handler by name with JSON arguments matching its input schema. Set dry_run to preview the REST request.")]
    async fn invoke_handler(
        &self,
        Parameters(params): Parameters<InvokeHandlerParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = params.arguments.unwrap_or(Value::Null);
        let name = params.name.trim();
        if params.dry_run.unwrap_or(false) {
            let request = self
                .control()
                .preview_request(name, &arguments)
                .await
                .map_err(helpers::map_err)?;
            return Ok(CallToolResult::success(vec![Content::json(request)?]));
        }
        let result = self
            .control()
            .invoke(name, &arguments)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(result)?]))
    }

    #[tool(description = "Report catalog version, schema fingerprint, handler counts by origin, last refresh outcome, and knowledge index size.")]
    async fn catalog_status(&self) -> Result<CallToolResult, ErrorData> {
        let status = self.control().status().await;
        Ok(CallToolResult::success(vec![Content::json(status)?]))
    }

    #[tool(description = "Re-discover the remote schema and update the catalog if it drifted. Optionally rebuild knowledge afterwards.")]
    async fn refresh_catalog(
        &self,
        Parameters(params): Parameters<RefreshCatalogParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let report = self.control().refresh().await.map_err(helpers::map_err)?;
        let mut contents = vec![Content::json(report)?];
        if params.rebuild_knowledge.unwrap_or(false) {
            let rebuilt = self
                .control()
                .rebuild_knowledge()
                .await
                .map_err(helpers::map_err)?;
            contents.push(Content::json(rebuilt)?);
        }
        Ok(CallToolResult::success(contents))
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
