//! Knowledge base: document construction, embedding, and retrieval.
//!
//! Documents are rebuilt wholesale from the current schema snapshot,
//! attribute definitions, and curated examples, then served from an
//! in-memory index that is swapped as a unit.

use std::{error::Error, fmt, io, path::Path};

use ddi_store::models::CuratedExample;
use tracing::debug;

use crate::remote::RemoteError;
use crate::store::StoreError;

pub mod builder;
pub mod corpus;
pub mod embed;
pub mod retriever;

pub use builder::KnowledgeBaseBuilder;
pub use embed::{Embedder, HashingEmbedder};
pub use retriever::{
    IndexGeneration,
    KnowledgeIndex,
    RetrievalOptions,
    ScoredDocument,
    SemanticRetriever,
};

#[derive(Debug)]
pub enum KnowledgeError {
    Attributes(RemoteError),
    Curated(io::Error),
    Store(StoreError),
    EmptySnapshot,
}

impl fmt::Display for KnowledgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attributes(err) => write!(f, "attribute definitions unavailable: {err}"),
            Self::Curated(err) => write!(f, "curated examples unreadable: {err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::EmptySnapshot => write!(f, "no schema snapshot installed; refresh the catalog first"),
        }
    }
}

impl Error for KnowledgeError {}

impl From<StoreError> for KnowledgeError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<RemoteError> for KnowledgeError {
    fn from(err: RemoteError) -> Self {
        Self::Attributes(err)
    }
}

/// Reads curated examples from a markdown file; a missing file has none.
///
/// # Errors
/// Returns `KnowledgeError::Curated` if the file exists but cannot be read.
pub async fn load_curated_examples(path: &Path) -> Result<Vec<CuratedExample>, KnowledgeError> {
    match tokio::fs::read_to_string(path).await {
        Ok(markdown) => Ok(corpus::parse_curated_examples(&markdown)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no curated examples file");
            Ok(Vec::new())
        }
        Err(err) => Err(KnowledgeError::Curated(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn curated_examples_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("examples.md");
        assert!(load_curated_examples(&path).await.expect("missing file").is_empty());

        tokio::fs::write(&path, "# Examples\n\n## Free IP in subnet\nUse next_available_ip.\n")
            .await
            .expect("write");
        let examples = load_curated_examples(&path).await.expect("load");
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].title, "Free IP in subnet");
    }
}
