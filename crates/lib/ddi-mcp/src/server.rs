//! MCP server runners for ddi-mcp.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use ddi_core::control::DdiControlPlane;
use rmcp::serve_server;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig,
    StreamableHttpService,
    session::local::LocalSessionManager,
};
use serde::Serialize;
use surrealdb::Connection;
use tracing::info;

use crate::DdiMcp;

pub const DEFAULT_HTTP_PORT: u16 = 4020;

type ServeResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Configuration for the MCP streamable HTTP server.
#[derive(Debug, Clone)]
pub struct McpHttpServerConfig {
    pub addr: SocketAddr,
    pub stateful_mode: bool,
    pub sse_keep_alive: Option<Duration>,
    pub sse_retry: Option<Duration>,
}

impl McpHttpServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stateful_mode: true,
            sse_keep_alive: Some(Duration::from_secs(15)),
            sse_retry: Some(Duration::from_secs(3)),
        }
    }

    #[must_use]
    pub const fn with_stateful_mode(mut self, stateful_mode: bool) -> Self {
        self.stateful_mode = stateful_mode;
        self
    }

    #[must_use]
    pub const fn with_sse_keep_alive(mut self, sse_keep_alive: Option<Duration>) -> Self {
        self.sse_keep_alive = sse_keep_alive;
        self
    }
}

impl Default for McpHttpServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_HTTP_PORT)))
    }
}

/// Body of the `/health` probe.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub catalog_version: u64,
    pub handlers: usize,
    pub knowledge_generation: Option<i64>,
}

async fn health<C>(State(control): State<Arc<DdiControlPlane<C>>>) -> Json<HealthReport>
where
    C: Connection + Send + Sync + 'static,
{
    let status = control.status().await;
    Json(HealthReport {
        // An empty catalog means neither the cache nor the remote API produced one yet.
        status: if status.handlers == 0 { "starting" } else { "ok" },
        catalog_version: status.version,
        handlers: status.handlers,
        knowledge_generation: status.knowledge_generation,
    })
}

/// Serves the MCP server over stdio.
///
/// # Errors
/// Returns any transport or server error.
pub async fn serve_stdio<C: Connection>(control: Arc<DdiControlPlane<C>>) -> ServeResult {
    let service = DdiMcp::with_control(control);
    let (stdin, stdout) = stdio();
    let running = serve_server(service, (stdin, stdout)).await?;
    let _ = running.waiting().await?;
    Ok(())
}

/// Serves MCP over streamable HTTP on `/mcp` until `shutdown` resolves.
///
/// `/health` reports the live catalog version and handler count.
///
/// # Errors
/// Returns any listener or server error.
pub async fn serve_streamable_http<C, F>(
    control: Arc<DdiControlPlane<C>>,
    config: McpHttpServerConfig,
    shutdown: F,
) -> ServeResult
where
    C: Connection + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let service_control = control.clone();
    let service: StreamableHttpService<DdiMcp<C>, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(DdiMcp::with_control(service_control.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                sse_keep_alive: config.sse_keep_alive,
                sse_retry: config.sse_retry,
                stateful_mode: config.stateful_mode,
                ..Default::default()
            },
        );

    let app = Router::new()
        .route("/health", get(health::<C>))
        .nest_service("/mcp", service)
        .with_state(control);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "serving MCP over streamable HTTP");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("streamable HTTP server stopped");
    Ok(())
}
