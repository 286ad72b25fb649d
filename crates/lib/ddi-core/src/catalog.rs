//! Merged handler catalog and the live, atomically swapped version of it.

use std::collections::BTreeMap;
use std::sync::Arc;

use ddi_store::models::{
    ContentFingerprint,
    HandlerDefinition,
    HandlerOrigin,
    OperationKind,
    SchemaSnapshot,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Union of compiled and custom handlers keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerCatalog {
    handlers: BTreeMap<String, HandlerDefinition>,
}

impl HandlerCatalog {
    /// Merges compiled handlers with custom ones; a custom handler replaces a
    /// compiled handler of the same name.
    #[must_use]
    pub fn merge(compiled: &[HandlerDefinition], custom: &[HandlerDefinition]) -> Self {
        let mut handlers = BTreeMap::new();
        for handler in compiled {
            handlers.insert(handler.name.clone(), handler.clone());
        }
        for handler in custom {
            handlers.insert(handler.name.clone(), handler.clone());
        }
        Self { handlers }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HandlerDefinition> {
        self.handlers.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerDefinition> {
        self.handlers.values()
    }

    /// Handlers matching optional resource-type and operation filters.
    #[must_use]
    pub fn filter(
        &self,
        resource_type: Option<&str>,
        kind: Option<OperationKind>,
    ) -> Vec<&HandlerDefinition> {
        self.iter()
            .filter(|handler| {
                resource_type.is_none_or(|wanted| handler.resource_type() == Some(wanted))
            })
            .filter(|handler| kind.is_none_or(|wanted| handler.operation_kind() == Some(wanted)))
            .collect()
    }

    #[must_use]
    pub fn count_by_origin(&self, origin: HandlerOrigin) -> usize {
        self.iter().filter(|handler| handler.origin == origin).count()
    }
}

/// One immutable, versioned catalog generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCatalog {
    pub version: u64,
    pub fingerprint: Option<ContentFingerprint>,
    pub snapshot: Arc<SchemaSnapshot>,
    pub catalog: HandlerCatalog,
}

impl LiveCatalog {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            fingerprint: None,
            snapshot: Arc::new(SchemaSnapshot::new()),
            catalog: HandlerCatalog::default(),
        }
    }
}

/// Holder of the current catalog generation.
///
/// Readers clone the inner `Arc` and keep a consistent view for as long as
/// they need it; installs replace the pointer under a short write lock.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<LiveCatalog>>>,
}

impl Default for CatalogHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(LiveCatalog::empty()))),
        }
    }

    pub async fn current(&self) -> Arc<LiveCatalog> {
        self.inner.read().await.clone()
    }

    /// Installs a new catalog generation and returns its version.
    pub async fn install(
        &self,
        fingerprint: ContentFingerprint,
        snapshot: Arc<SchemaSnapshot>,
        catalog: HandlerCatalog,
    ) -> u64 {
        let mut guard = self.inner.write().await;
        let version = guard.version + 1;
        *guard = Arc::new(LiveCatalog {
            version,
            fingerprint: Some(fingerprint),
            snapshot,
            catalog,
        });
        version
    }
}

#[cfg(test)]
mod tests {
    use ddi_store::models::{HandlerBinding, RestMethod};
    use serde_json::json;

    use super::*;

    fn handler(name: &str, description: &str, origin: HandlerOrigin) -> HandlerDefinition {
        HandlerDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({"type": "object"}),
            binding: HandlerBinding::Rest {
                method: RestMethod::Get,
                path: "network".to_string(),
            },
            origin,
        }
    }

    #[test]
    fn custom_handler_wins_on_collision() {
        let compiled = vec![
            handler("Search:network", "compiled", HandlerOrigin::Compiled),
            handler("List:network", "compiled", HandlerOrigin::Compiled),
        ];
        let custom = vec![handler("Search:network", "custom", HandlerOrigin::Custom)];
        let catalog = HandlerCatalog::merge(&compiled, &custom);
        assert_eq!(catalog.len(), 2);
        let winner = catalog.get("Search:network").expect("handler present");
        assert_eq!(winner.description, "custom");
        assert_eq!(catalog.count_by_origin(HandlerOrigin::Custom), 1);
    }

    #[tokio::test]
    async fn readers_keep_their_generation_across_installs() {
        let handle = CatalogHandle::new();
        let before = handle.current().await;
        let version = handle
            .install(
                ContentFingerprint("abc".to_string()),
                Arc::new(SchemaSnapshot::new()),
                HandlerCatalog::merge(&[handler("List:network", "x", HandlerOrigin::Compiled)], &[]),
            )
            .await;
        assert_eq!(version, 1);
        assert_eq!(before.version, 0);
        assert!(before.catalog.is_empty());
        assert_eq!(handle.current().await.catalog.len(), 1);
    }
}
