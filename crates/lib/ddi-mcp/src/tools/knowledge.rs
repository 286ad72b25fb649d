use ddi_core::knowledge::ScoredDocument;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use surrealdb::Connection;

use crate::{DdiMcp, helpers};

/// Parameters for retrieving knowledge documents.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RetrieveKnowledgeParams {
    pub query: String,
    /// Maximum number of documents; defaults to the configured cutoff.
    pub k: Option<usize>,
}

/// Retrieved document without its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct KnowledgeHit {
    pub id: String,
    pub category: String,
    pub score: f32,
    pub resource_type: Option<String>,
    pub attribute_name: Option<String>,
    pub body: String,
}

impl From<ScoredDocument> for KnowledgeHit {
    fn from(hit: ScoredDocument) -> Self {
        Self {
            id: hit.document.id,
            category: hit.document.category.as_str().to_string(),
            score: hit.score,
            resource_type: hit.document.resource_type,
            attribute_name: hit.document.attribute_name,
            body: hit.document.body,
        }
    }
}

#[tool_router(router = tool_router_knowledge, vis = "pub")]
impl<C: Connection> DdiMcp<C> {
    #[tool(description = "Retrieve knowledge documents most relevant to a request, most relevant first. Returns an empty list when no knowledge is indexed.")]
    async fn retrieve_knowledge(
        &self,
        Parameters(params): Parameters<RetrieveKnowledgeParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let query = params.query.trim();
        if query.is_empty() {
            return Err(helpers::mcp_err(ErrorCode::INVALID_PARAMS, "query is required"));
        }
        let hits: Vec<KnowledgeHit> = self
            .control()
            .retrieve(query, params.k)
            .await
            .into_iter()
            .map(KnowledgeHit::from)
            .collect();
        Ok(CallToolResult::success(vec![Content::json(hits)?]))
    }

    #[tool(description = "Rebuild the knowledge index from the live schema, attribute definitions, and curated examples.")]
    async fn rebuild_knowledge(&self) -> Result<CallToolResult, ErrorData> {
        let report = self
            .control()
            .rebuild_knowledge()
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(report)?]))
    }
}
