//! Best-effort schema discovery across every remote resource type.

use std::{error::Error, fmt, sync::Arc};

use ddi_store::models::SchemaSnapshot;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::remote::{CatalogSource, RemoteError};

pub const DEFAULT_DISCOVERY_CONCURRENCY: usize = 8;

/// A resource type excluded from the snapshot and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryFailure {
    pub resource_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub snapshot: SchemaSnapshot,
    pub failures: Vec<DiscoveryFailure>,
}

#[derive(Debug)]
pub enum DiscoveryError {
    Enumeration(RemoteError),
    NothingEnumerated,
    AllFailed { failures: Vec<DiscoveryFailure> },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enumeration(err) => write!(f, "failed to enumerate resource types: {err}"),
            Self::NothingEnumerated => write!(f, "remote enumerated no resource types"),
            Self::AllFailed { failures } => write!(
                f,
                "schema fetch failed for all {} resource types",
                failures.len()
            ),
        }
    }
}

impl Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Enumeration(err) => Some(err),
            Self::NothingEnumerated | Self::AllFailed { .. } => None,
        }
    }
}

pub struct SchemaDiscovery {
    source: Arc<dyn CatalogSource>,
    concurrency: usize,
}

impl SchemaDiscovery {
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            concurrency: DEFAULT_DISCOVERY_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn CatalogSource> {
        &self.source
    }

    /// Enumerates resource types and fetches each schema with bounded fan-out.
    ///
    /// A single type's failure excludes that type and is reported in the
    /// returned failures.
    ///
    /// # Errors
    /// Returns `DiscoveryError` when enumeration fails, yields nothing, or
    /// every schema fetch fails.
    pub async fn discover(&self) -> Result<DiscoveryReport, DiscoveryError> {
        let mut types = self
            .source
            .list_resource_types()
            .await
            .map_err(DiscoveryError::Enumeration)?;
        types.sort();
        types.dedup();
        if types.is_empty() {
            return Err(DiscoveryError::NothingEnumerated);
        }
        info!(types = types.len(), concurrency = self.concurrency, "schema discovery started");

        let source = &*self.source;
        let results: Vec<_> = stream::iter(types)
            .map(|name| async move {
                let result = source.fetch_schema(&name).await;
                (name, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut snapshot = SchemaSnapshot::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(mut descriptor) => {
                    descriptor.name.clone_from(&name);
                    snapshot.insert(descriptor);
                }
                Err(err) => {
                    warn!(resource_type = %name, error = %err, "excluding resource type from snapshot");
                    failures.push(DiscoveryFailure {
                        resource_type: name,
                        reason: err.to_string(),
                    });
                }
            }
        }
        failures.sort_by(|left, right| left.resource_type.cmp(&right.resource_type));

        if snapshot.is_empty() {
            return Err(DiscoveryError::AllFailed { failures });
        }
        info!(
            discovered = snapshot.len(),
            excluded = failures.len(),
            "schema discovery finished"
        );
        Ok(DiscoveryReport { snapshot, failures })
    }
}
