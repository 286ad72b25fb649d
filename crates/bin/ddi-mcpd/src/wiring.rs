use std::error::Error;
use std::sync::Arc;

use ddi_core::cache::RefreshCache;
use ddi_core::control::DdiControlPlane;
use ddi_core::custom::CustomHandlerStore;
use ddi_core::discovery::SchemaDiscovery;
use ddi_core::invoke::InvokeOptions;
use ddi_core::knowledge::{KnowledgeBaseBuilder, RetrievalOptions};
use ddi_core::remote::{WapiClient, WapiClientConfig};
use ddi_core::retry::RetryPolicy;
use ddi_core::store::SurrealKnowledgeStore;
use ddi_core::upgrade::CatalogMaintainer;
use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::config::DdiConfig;

type BoxError = Box<dyn Error + Send + Sync>;

/// Connects to the knowledge database, in memory or remote.
pub async fn connect_store(config: &DdiConfig) -> Result<Surreal<Any>, surrealdb::Error> {
    let db = any::connect(config.db_endpoint.as_str()).await?;
    if let (Some(username), Some(password)) =
        (config.db_username.as_ref(), config.db_password.as_ref())
    {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }
    db.use_ns(&config.db_namespace)
        .use_db(&config.db_database)
        .await?;
    info!(
        endpoint = %config.db_endpoint,
        namespace = %config.db_namespace,
        database = %config.db_database,
        "knowledge store connected"
    );
    Ok(db)
}

/// Assembles the remote client, catalog maintainer, and control plane.
pub async fn build_control_plane(config: &DdiConfig) -> Result<DdiControlPlane<Any>, BoxError> {
    let retry = RetryPolicy::default()
        .with_max_attempts(config.retry_attempts)
        .with_base_delay(config.retry_base_delay)
        .with_timeout(config.request_timeout);
    let wapi_config = WapiClientConfig::new(
        config.wapi_host.as_str(),
        config.wapi_username.as_str(),
        config.wapi_password.as_str(),
    )
    .with_version(config.wapi_version.as_str())
    .with_verify_tls(config.verify_tls)
    .with_ca_bundle(config.ca_bundle.clone())
    .with_retry(retry)
    .with_fallback_types(config.fallback_types.clone());
    let wapi = Arc::new(WapiClient::new(wapi_config)?);
    info!(base_url = wapi.base_url(), "remote API client ready");

    let discovery =
        SchemaDiscovery::new(wapi.clone()).with_concurrency(config.discovery_concurrency);
    let maintainer = Arc::new(CatalogMaintainer::new(
        discovery,
        CustomHandlerStore::new(config.custom_handlers.clone()),
        RefreshCache::in_dir(&config.cache_dir),
    ));

    let db = connect_store(config).await?;
    let mut control = DdiControlPlane::new(maintainer, wapi, SurrealKnowledgeStore::new(db))
        .with_builder(KnowledgeBaseBuilder::default().with_field_doc_cap(config.field_doc_cap))
        .with_retrieval_options(
            RetrievalOptions::default()
                .with_default_k(config.retrieval_top_k)
                .with_min_relevance(config.retrieval_min_relevance),
        )
        .with_invoke_options(InvokeOptions::default().with_anchoring(config.regex_anchoring));
    if let Some(path) = &config.curated_examples {
        control = control.with_curated_path(path.clone());
    }
    Ok(control)
}
