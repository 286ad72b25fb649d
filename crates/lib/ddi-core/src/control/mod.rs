use std::{error::Error, fmt, path::PathBuf, sync::Arc};

use surrealdb::Connection;
use tokio::sync::Mutex;

use crate::invoke::{InvokeError, InvokeOptions};
use crate::knowledge::{KnowledgeBaseBuilder, KnowledgeError, KnowledgeIndex, RetrievalOptions, SemanticRetriever};
use crate::remote::Invoker;
use crate::store::{StoreError, SurrealKnowledgeStore};
use crate::upgrade::{CatalogMaintainer, RefreshError};

pub mod catalog;
pub mod knowledge;

pub use catalog::CatalogStatus;
pub use knowledge::KnowledgeRebuildReport;

#[derive(Debug)]
pub enum ControlError {
    Refresh(RefreshError),
    Invoke(InvokeError),
    Knowledge(KnowledgeError),
    NotFound(String),
    InvalidInput(String),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refresh(err) => write!(f, "{err}"),
            Self::Invoke(err) => write!(f, "{err}"),
            Self::Knowledge(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
        }
    }
}

impl Error for ControlError {}

impl From<RefreshError> for ControlError {
    fn from(err: RefreshError) -> Self {
        Self::Refresh(err)
    }
}

impl From<InvokeError> for ControlError {
    fn from(err: InvokeError) -> Self {
        Self::Invoke(err)
    }
}

impl From<KnowledgeError> for ControlError {
    fn from(err: KnowledgeError) -> Self {
        Self::Knowledge(err)
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        Self::Knowledge(KnowledgeError::Store(err))
    }
}

/// Inbound interface over the live catalog and the knowledge base.
pub struct DdiControlPlane<C: Connection> {
    maintainer: Arc<CatalogMaintainer>,
    invoker: Arc<dyn Invoker>,
    store: SurrealKnowledgeStore<C>,
    builder: KnowledgeBaseBuilder,
    retriever: SemanticRetriever,
    invoke_options: InvokeOptions,
    curated_path: Option<PathBuf>,
    rebuild_lock: Arc<Mutex<()>>,
}

impl<C: Connection> Clone for DdiControlPlane<C> {
    fn clone(&self) -> Self {
        Self {
            maintainer: self.maintainer.clone(),
            invoker: self.invoker.clone(),
            store: self.store.clone(),
            builder: self.builder.clone(),
            retriever: self.retriever.clone(),
            invoke_options: self.invoke_options,
            curated_path: self.curated_path.clone(),
            rebuild_lock: self.rebuild_lock.clone(),
        }
    }
}

impl<C: Connection> DdiControlPlane<C> {
    pub fn new(
        maintainer: Arc<CatalogMaintainer>,
        invoker: Arc<dyn Invoker>,
        store: SurrealKnowledgeStore<C>,
    ) -> Self {
        let builder = KnowledgeBaseBuilder::default();
        let retriever = SemanticRetriever::new(KnowledgeIndex::new(), builder.embedder().clone());
        Self {
            maintainer,
            invoker,
            store,
            builder,
            retriever,
            invoke_options: InvokeOptions::default(),
            curated_path: None,
            rebuild_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Replaces the knowledge builder; retrieval switches to its embedder.
    #[must_use]
    pub fn with_builder(mut self, builder: KnowledgeBaseBuilder) -> Self {
        let options = *self.retriever.options();
        self.retriever = SemanticRetriever::new(self.retriever.index().clone(), builder.embedder().clone())
            .with_options(options);
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_retrieval_options(mut self, options: RetrievalOptions) -> Self {
        self.retriever = self.retriever.with_options(options);
        self
    }

    #[must_use]
    pub const fn with_invoke_options(mut self, options: InvokeOptions) -> Self {
        self.invoke_options = options;
        self
    }

    #[must_use]
    pub fn with_curated_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.curated_path = Some(path.into());
        self
    }

    pub const fn maintainer(&self) -> &Arc<CatalogMaintainer> {
        &self.maintainer
    }

    pub const fn store(&self) -> &SurrealKnowledgeStore<C> {
        &self.store
    }

    pub const fn retriever(&self) -> &SemanticRetriever {
        &self.retriever
    }
}
