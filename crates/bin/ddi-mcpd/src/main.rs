//! Daemon entry point for the DDI MCP server.
//!
//! Loads configuration, restores the cached catalog, refreshes it against the
//! remote API, builds the knowledge index, and serves MCP over stdio and/or
//! streamable HTTP.

mod config;
mod shutdown;
mod telemetry;
mod wiring;

use std::error::Error;
use std::sync::Arc;

use ddi_core::control::DdiControlPlane;
use ddi_core::upgrade::RefreshOutcome;
use ddi_mcp::server::{serve_stdio, serve_streamable_http};
use surrealdb::Connection;
use tracing::{info, warn};

use crate::config::DdiConfig;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = DdiConfig::from_args()?;
    telemetry::init(config.verbose);

    let stopping = shutdown::listen();
    let control = Arc::new(wiring::build_control_plane(&config).await?);
    bootstrap(&control).await?;

    let http_config = config.http_server_config();
    match (config.enable_stdio, config.mcp_serve) {
        (true, true) => {
            let http_control = control.clone();
            let http_stop = shutdown::wait(stopping.clone());
            tokio::spawn(async move {
                if let Err(err) = serve_streamable_http(http_control, http_config, http_stop).await {
                    warn!(error = %err, "streamable HTTP server stopped");
                }
            });
            run_stdio(control, stopping).await
        }
        (true, false) => run_stdio(control, stopping).await,
        (false, true) => {
            serve_streamable_http(control, http_config, shutdown::wait(stopping)).await
        }
        (false, false) => {
            warn!("no MCP transport enabled; exiting");
            Ok(())
        }
    }
}

async fn run_stdio<C: Connection>(
    control: Arc<DdiControlPlane<C>>,
    stopping: tokio::sync::watch::Receiver<bool>,
) -> Result<(), BoxError> {
    tokio::select! {
        result = serve_stdio(control) => result,
        () = shutdown::wait(stopping) => {
            info!("stdio transport stopped");
            Ok(())
        }
    }
}

/// Brings the catalog and knowledge index up to date before serving.
///
/// Only a refresh with no catalog to fall back to is fatal.
async fn bootstrap<C: Connection>(control: &DdiControlPlane<C>) -> Result<(), BoxError> {
    if let Some(version) = control.maintainer().warm_start().await {
        info!(version, "serving cached catalog while refreshing");
    }
    let report = control.refresh().await?;
    info!(
        outcome = ?report.outcome,
        version = report.version,
        handlers = report.handler_count,
        excluded = report.excluded.len(),
        "catalog ready"
    );

    let has_knowledge = match control.store().latest_generation().await {
        Ok(latest) => latest.is_some(),
        Err(err) => {
            warn!(error = %err, "knowledge store unavailable at startup");
            false
        }
    };
    if report.outcome == RefreshOutcome::Drifted || !has_knowledge {
        match control.rebuild_knowledge().await {
            Ok(rebuilt) => info!(
                generation = rebuilt.generation,
                documents = rebuilt.documents,
                "knowledge index ready"
            ),
            Err(err) => warn!(error = %err, "knowledge build failed; retrieval will return no documents"),
        }
    }
    Ok(())
}
