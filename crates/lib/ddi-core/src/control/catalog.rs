use ddi_store::models::{ContentFingerprint, HandlerDefinition, HandlerOrigin, OperationKind};
use serde::Serialize;
use serde_json::Value;
use surrealdb::Connection;
use tracing::info;

use crate::invoke::{InvokeError, build_request};
use crate::remote::RestRequest;
use crate::upgrade::RefreshReport;

use super::{ControlError, DdiControlPlane};

/// Point-in-time summary of the live catalog and knowledge index.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatus {
    pub version: u64,
    pub fingerprint: Option<ContentFingerprint>,
    pub resource_types: usize,
    pub handlers: usize,
    pub compiled_handlers: usize,
    pub custom_handlers: usize,
    pub last_refresh: Option<RefreshReport>,
    pub knowledge_generation: Option<i64>,
    pub knowledge_documents: usize,
}

impl<C: Connection> DdiControlPlane<C> {
    /// Lists handlers from the current catalog, optionally filtered.
    pub async fn list_handlers(
        &self,
        resource_type: Option<&str>,
        kind: Option<OperationKind>,
    ) -> Vec<HandlerDefinition> {
        let live = self.maintainer.handle().current().await;
        live.catalog
            .filter(resource_type, kind)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Fetches one handler by name.
    ///
    /// # Errors
    /// Returns `ControlError::NotFound` if the current catalog lacks it.
    pub async fn describe_handler(&self, name: &str) -> Result<HandlerDefinition, ControlError> {
        let live = self.maintainer.handle().current().await;
        live.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("handler {name}")))
    }

    /// Translates an invocation without executing it.
    ///
    /// # Errors
    /// Returns `ControlError::Invoke` if the handler is unknown or the
    /// arguments are invalid.
    pub async fn preview_request(&self, name: &str, args: &Value) -> Result<RestRequest, ControlError> {
        let live = self.maintainer.handle().current().await;
        let handler = live
            .catalog
            .get(name)
            .ok_or_else(|| InvokeError::UnknownHandler(name.to_string()))?;
        Ok(build_request(handler, args, &self.invoke_options)?)
    }

    /// Resolves a handler from the current catalog and executes it.
    ///
    /// # Errors
    /// Returns `ControlError::Invoke` if translation fails or the remote call
    /// returns an error.
    pub async fn invoke(&self, name: &str, args: &Value) -> Result<Value, ControlError> {
        let request = self.preview_request(name, args).await?;
        info!(handler = name, method = %request.method, path = %request.path, "invoking handler");
        let result = self.invoker.execute(request).await.map_err(InvokeError::from)?;
        Ok(result)
    }

    /// Runs a catalog refresh cycle.
    ///
    /// # Errors
    /// Returns `ControlError::Refresh` when discovery fails with nothing to
    /// fall back to.
    pub async fn refresh(&self) -> Result<RefreshReport, ControlError> {
        Ok(self.maintainer.refresh().await?)
    }

    pub async fn status(&self) -> CatalogStatus {
        let live = self.maintainer.handle().current().await;
        let index = self.retriever.index().current().await;
        CatalogStatus {
            version: live.version,
            fingerprint: live.fingerprint.clone(),
            resource_types: live.snapshot.len(),
            handlers: live.catalog.len(),
            compiled_handlers: live.catalog.count_by_origin(HandlerOrigin::Compiled),
            custom_handlers: live.catalog.count_by_origin(HandlerOrigin::Custom),
            last_refresh: self.maintainer.last_report().await,
            knowledge_generation: index.as_ref().map(|index| index.generation),
            knowledge_documents: index.map_or(0, |index| index.documents.len()),
        }
    }
}
