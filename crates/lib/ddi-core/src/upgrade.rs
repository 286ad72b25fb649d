//! Drift detection and catalog maintenance.
//!
//! A refresh discovers the remote schema, fingerprints it, and compares the
//! result with the persisted cache. A matching fingerprint is the stable fast
//! path: the cached compiled handlers are re-merged with the current custom
//! set. A mismatch recompiles, persists atomically, and installs the new
//! catalog. When discovery fails outright the last-good cache is served.
//!
//! Refreshes are cooperative: each request takes a ticket from a watch
//! channel, and an older refresh still preparing when a newer ticket is
//! issued abandons its work.

use std::sync::Arc;
use std::{error::Error, fmt};

use chrono::{DateTime, Utc};
use ddi_store::models::{ContentFingerprint, HandlerDefinition, SchemaSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{info, warn};

use crate::cache::{CacheError, PersistedCatalog, RefreshCache};
use crate::catalog::{CatalogHandle, HandlerCatalog};
use crate::compiler::{CompileIssue, CompileOutput, ToolCompiler};
use crate::custom::CustomHandlerStore;
use crate::discovery::{DiscoveryError, DiscoveryFailure, DiscoveryReport, SchemaDiscovery};
use crate::fingerprint::fingerprint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Fresh fingerprint equals the cached one.
    Stable,
    /// Fingerprint changed, or no usable cache existed; handlers recompiled.
    Drifted,
    /// Discovery failed; the last-good catalog is being served.
    Fallback,
    /// A newer refresh took over before this one committed.
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshReport {
    pub outcome: RefreshOutcome,
    pub version: u64,
    pub fingerprint: Option<ContentFingerprint>,
    pub previous_fingerprint: Option<ContentFingerprint>,
    pub handler_count: usize,
    #[serde(default)]
    pub excluded: Vec<DiscoveryFailure>,
    #[serde(default)]
    pub skipped: Vec<CompileIssue>,
    pub warning: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RefreshReport {
    fn new(outcome: RefreshOutcome, version: u64) -> Self {
        Self {
            outcome,
            version,
            fingerprint: None,
            previous_fingerprint: None,
            handler_count: 0,
            excluded: Vec::new(),
            skipped: Vec::new(),
            warning: None,
            finished_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum RefreshError {
    /// Discovery failed and there is no catalog to fall back to.
    Unavailable(DiscoveryError),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(err) => {
                write!(f, "catalog unavailable and no cached catalog exists: {err}")
            }
        }
    }
}

impl Error for RefreshError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
        }
    }
}

enum Prepared {
    Discovered {
        report: DiscoveryReport,
        fingerprint: ContentFingerprint,
        cached: Option<PersistedCatalog>,
        compiled: Option<CompileOutput>,
        custom: Vec<HandlerDefinition>,
    },
    Failed {
        error: DiscoveryError,
        cached: Option<PersistedCatalog>,
        custom: Vec<HandlerDefinition>,
    },
}

pub struct CatalogMaintainer {
    discovery: SchemaDiscovery,
    compiler: ToolCompiler,
    custom: CustomHandlerStore,
    cache: RefreshCache,
    handle: CatalogHandle,
    tickets: watch::Sender<u64>,
    commit_lock: Mutex<()>,
    last_report: RwLock<Option<RefreshReport>>,
}

impl CatalogMaintainer {
    #[must_use]
    pub fn new(discovery: SchemaDiscovery, custom: CustomHandlerStore, cache: RefreshCache) -> Self {
        let (tickets, _) = watch::channel(0);
        Self {
            discovery,
            compiler: ToolCompiler::new(),
            custom,
            cache,
            handle: CatalogHandle::new(),
            tickets,
            commit_lock: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    #[must_use]
    pub const fn handle(&self) -> &CatalogHandle {
        &self.handle
    }

    #[must_use]
    pub const fn discovery(&self) -> &SchemaDiscovery {
        &self.discovery
    }

    #[must_use]
    pub const fn custom_store(&self) -> &CustomHandlerStore {
        &self.custom
    }

    pub async fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.read().await.clone()
    }

    /// Installs the persisted catalog, if any, without contacting the remote.
    ///
    /// Returns the installed version, or `None` when no usable cache exists.
    pub async fn warm_start(&self) -> Option<u64> {
        let cached = self.load_cache().await?;
        let custom = self.custom.load().await;
        let _commit = self.commit_lock.lock().await;
        let catalog = HandlerCatalog::merge(&cached.compiled, &custom);
        let version = self
            .install_if_changed(cached.fingerprint.clone(), Arc::new(cached.snapshot), catalog)
            .await;
        info!(version, fingerprint = %cached.fingerprint, "loaded cached catalog");
        Some(version)
    }

    /// Runs one discovery and maintenance cycle.
    ///
    /// # Errors
    /// Returns `RefreshError::Unavailable` only when discovery fails entirely
    /// and neither a cached nor a live catalog exists.
    pub async fn refresh(&self) -> Result<RefreshReport, RefreshError> {
        let ticket = self.next_ticket();
        let mut watcher = self.tickets.subscribe();
        let prepared = tokio::select! {
            prepared = self.prepare() => prepared,
            () = wait_superseded(&mut watcher, ticket) => {
                info!(ticket, "refresh abandoned for a newer request");
                return Ok(self.superseded_report().await);
            }
        };

        let _commit = self.commit_lock.lock().await;
        let current = *self.tickets.borrow();
        if current != ticket {
            info!(ticket, "refresh superseded before commit");
            return Ok(self.superseded_report().await);
        }
        let report = self.commit(prepared).await?;
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    fn next_ticket(&self) -> u64 {
        let mut ticket = 0;
        self.tickets.send_modify(|current| {
            *current += 1;
            ticket = *current;
        });
        ticket
    }

    async fn superseded_report(&self) -> RefreshReport {
        let live = self.handle.current().await;
        let mut report = RefreshReport::new(RefreshOutcome::Superseded, live.version);
        report.fingerprint.clone_from(&live.fingerprint);
        report.handler_count = live.catalog.len();
        report
    }

    async fn load_cache(&self) -> Option<PersistedCatalog> {
        match self.cache.load().await {
            Ok(cached) => cached,
            Err(CacheError::Corrupt(message)) => {
                warn!(path = %self.cache.path().display(), %message, "cached catalog is corrupt; treating as missing");
                None
            }
            Err(err) => {
                warn!(path = %self.cache.path().display(), error = %err, "failed to read cached catalog");
                None
            }
        }
    }

    async fn prepare(&self) -> Prepared {
        let custom = self.custom.load().await;
        let cached = self.load_cache().await;
        match self.discovery.discover().await {
            Ok(report) => {
                let fingerprint = fingerprint(&report.snapshot);
                let stable = cached
                    .as_ref()
                    .is_some_and(|cached| cached.fingerprint == fingerprint);
                let compiled = (!stable).then(|| self.compiler.compile(&report.snapshot));
                Prepared::Discovered {
                    report,
                    fingerprint,
                    cached,
                    compiled,
                    custom,
                }
            }
            Err(error) => Prepared::Failed {
                error,
                cached,
                custom,
            },
        }
    }

    async fn commit(&self, prepared: Prepared) -> Result<RefreshReport, RefreshError> {
        match prepared {
            Prepared::Discovered {
                report,
                fingerprint,
                cached,
                compiled,
                custom,
            } => Ok(match (cached, compiled) {
                (Some(cached), None) => self.commit_stable(report, fingerprint, cached, &custom).await,
                (cached, compiled) => {
                    let compiled =
                        compiled.unwrap_or_else(|| self.compiler.compile(&report.snapshot));
                    let previous = cached.map(|cached| cached.fingerprint);
                    self.commit_drifted(report, fingerprint, previous, compiled, &custom)
                        .await
                }
            }),
            Prepared::Failed {
                error,
                cached,
                custom,
            } => self.commit_fallback(error, cached, &custom).await,
        }
    }

    async fn commit_stable(
        &self,
        discovered: DiscoveryReport,
        fingerprint: ContentFingerprint,
        cached: PersistedCatalog,
        custom: &[HandlerDefinition],
    ) -> RefreshReport {
        let catalog = HandlerCatalog::merge(&cached.compiled, custom);
        let mut warning = None;
        if catalog != cached.catalog {
            let persisted = PersistedCatalog::new(
                fingerprint.clone(),
                cached.snapshot,
                cached.compiled,
                catalog.clone(),
            );
            if let Err(err) = self.cache.store(&persisted).await {
                warn!(error = %err, "failed to persist re-merged catalog");
                warning = Some(format!("catalog not persisted: {err}"));
            }
        }
        let handler_count = catalog.len();
        let version = self
            .install_if_changed(fingerprint.clone(), Arc::new(discovered.snapshot), catalog)
            .await;
        info!(version, %fingerprint, "schema unchanged; catalog stable");
        let mut report = RefreshReport::new(RefreshOutcome::Stable, version);
        report.previous_fingerprint = Some(fingerprint.clone());
        report.fingerprint = Some(fingerprint);
        report.handler_count = handler_count;
        report.excluded = discovered.failures;
        report.warning = warning;
        report
    }

    async fn commit_drifted(
        &self,
        discovered: DiscoveryReport,
        fingerprint: ContentFingerprint,
        previous: Option<ContentFingerprint>,
        compiled: CompileOutput,
        custom: &[HandlerDefinition],
    ) -> RefreshReport {
        match &previous {
            Some(previous) => {
                warn!(%previous, current = %fingerprint, "schema drift detected; recompiling handlers");
            }
            None => info!(current = %fingerprint, "no cached catalog; compiling handlers"),
        }
        let catalog = HandlerCatalog::merge(&compiled.handlers, custom);
        let persisted = PersistedCatalog::new(
            fingerprint.clone(),
            discovered.snapshot.clone(),
            compiled.handlers,
            catalog.clone(),
        );
        let warning = match self.cache.store(&persisted).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "failed to persist recompiled catalog; serving it from memory");
                Some(format!("catalog not persisted: {err}"))
            }
        };
        let handler_count = catalog.len();
        let version = self
            .install_if_changed(fingerprint.clone(), Arc::new(discovered.snapshot), catalog)
            .await;
        info!(version, handlers = handler_count, "installed recompiled catalog");
        let mut report = RefreshReport::new(RefreshOutcome::Drifted, version);
        report.fingerprint = Some(fingerprint);
        report.previous_fingerprint = previous;
        report.handler_count = handler_count;
        report.excluded = discovered.failures;
        report.skipped = compiled.issues;
        report.warning = warning;
        report
    }

    async fn commit_fallback(
        &self,
        error: DiscoveryError,
        cached: Option<PersistedCatalog>,
        custom: &[HandlerDefinition],
    ) -> Result<RefreshReport, RefreshError> {
        let warning = format!("discovery failed; serving last-good catalog: {error}");
        let (version, fingerprint, handler_count) = if let Some(cached) = cached {
            let catalog = HandlerCatalog::merge(&cached.compiled, custom);
            let handler_count = catalog.len();
            let version = self
                .install_if_changed(cached.fingerprint.clone(), Arc::new(cached.snapshot), catalog)
                .await;
            (version, Some(cached.fingerprint), handler_count)
        } else {
            let live = self.handle.current().await;
            if live.version == 0 {
                return Err(RefreshError::Unavailable(error));
            }
            (live.version, live.fingerprint.clone(), live.catalog.len())
        };
        warn!(version, %error, "discovery failed; falling back to last-good catalog");
        let mut report = RefreshReport::new(RefreshOutcome::Fallback, version);
        report.previous_fingerprint.clone_from(&fingerprint);
        report.fingerprint = fingerprint;
        report.handler_count = handler_count;
        if let DiscoveryError::AllFailed { failures } = error {
            report.excluded = failures;
        }
        report.warning = Some(warning);
        Ok(report)
    }

    async fn install_if_changed(
        &self,
        fingerprint: ContentFingerprint,
        snapshot: Arc<SchemaSnapshot>,
        catalog: HandlerCatalog,
    ) -> u64 {
        let live = self.handle.current().await;
        if live.version > 0
            && live.fingerprint.as_ref() == Some(&fingerprint)
            && live.catalog == catalog
        {
            return live.version;
        }
        self.handle.install(fingerprint, snapshot, catalog).await
    }
}

async fn wait_superseded(watcher: &mut watch::Receiver<u64>, ticket: u64) {
    let closed = watcher.wait_for(|current| *current != ticket).await.is_err();
    if closed {
        futures::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use ddi_store::models::{AttributeDefinition, FieldDescriptor, ResourceTypeDescriptor};
    use futures::future::BoxFuture;

    use super::*;
    use crate::remote::{CatalogSource, RemoteError};

    struct SlowSource {
        slow: AtomicBool,
    }

    impl CatalogSource for SlowSource {
        fn list_resource_types(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>> {
            let slow = self.slow.swap(false, Ordering::SeqCst);
            Box::pin(async move {
                if slow {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(vec!["network".to_string()])
            })
        }

        fn fetch_schema<'a>(
            &'a self,
            resource_type: &'a str,
        ) -> BoxFuture<'a, Result<ResourceTypeDescriptor, RemoteError>> {
            Box::pin(async move {
                Ok(ResourceTypeDescriptor::new(
                    resource_type,
                    vec![FieldDescriptor::new("network", "string").searchable()],
                ))
            })
        }

        fn fetch_attribute_definitions(
            &self,
        ) -> BoxFuture<'_, Result<Vec<AttributeDefinition>, RemoteError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test]
    async fn newer_refresh_supersedes_older_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = Arc::new(SlowSource {
            slow: AtomicBool::new(true),
        });
        let maintainer = CatalogMaintainer::new(
            SchemaDiscovery::new(source),
            CustomHandlerStore::disabled(),
            RefreshCache::in_dir(dir.path()),
        );
        let (older, newer) = tokio::join!(maintainer.refresh(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            maintainer.refresh().await
        });
        let older = older.expect("older refresh resolves");
        let newer = newer.expect("newer refresh resolves");
        assert_eq!(older.outcome, RefreshOutcome::Superseded);
        assert_eq!(newer.outcome, RefreshOutcome::Drifted);
        assert_eq!(maintainer.handle().current().await.catalog.len(), 6);
    }
}
