use std::cmp::Ordering;
use std::sync::Arc;

use ddi_store::models::KnowledgeDocument;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::embed::{Embedder, cosine_similarity};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 50;

/// Cutoff policy applied to every retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    pub default_k: usize,
    pub max_k: usize,
    pub min_relevance: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_TOP_K,
            max_k: MAX_TOP_K,
            min_relevance: 0.0,
        }
    }
}

impl RetrievalOptions {
    #[must_use]
    pub const fn with_default_k(mut self, default_k: usize) -> Self {
        self.default_k = default_k;
        self
    }

    #[must_use]
    pub const fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    #[must_use]
    pub fn resolve_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_k).min(self.max_k)
    }
}

/// One indexed build of the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct IndexGeneration {
    pub generation: i64,
    pub documents: Vec<KnowledgeDocument>,
}

/// In-memory view of the current knowledge generation.
///
/// `None` means nothing has been loaded yet; an installed generation may
/// still be empty.
#[derive(Clone, Default)]
pub struct KnowledgeIndex {
    inner: Arc<RwLock<Option<Arc<IndexGeneration>>>>,
}

impl KnowledgeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.inner.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Swaps in `generation` unless a newer one is already installed.
    ///
    /// Returns whether the swap happened.
    pub async fn install(&self, generation: i64, documents: Vec<KnowledgeDocument>) -> bool {
        let mut slot = self.inner.write().await;
        if slot.as_ref().is_some_and(|current| current.generation > generation) {
            debug!(generation, "ignoring knowledge generation older than the installed one");
            return false;
        }
        *slot = Some(Arc::new(IndexGeneration {
            generation,
            documents,
        }));
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub score: f32,
    pub document: KnowledgeDocument,
}

/// Ranks indexed documents by cosine similarity to an embedded query.
#[derive(Clone)]
pub struct SemanticRetriever {
    index: KnowledgeIndex,
    embedder: Arc<dyn Embedder>,
    options: RetrievalOptions,
}

impl SemanticRetriever {
    #[must_use]
    pub fn new(index: KnowledgeIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            options: RetrievalOptions::default(),
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    #[must_use]
    pub const fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Returns up to `k` documents, most relevant first.
    ///
    /// An unloaded or empty index yields an empty result. Documents with no
    /// similarity, or below the relevance floor, are never returned.
    pub async fn retrieve(&self, text: &str, k: Option<usize>) -> Vec<ScoredDocument> {
        let k = self.options.resolve_k(k);
        if k == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        let Some(generation) = self.index.current().await else {
            warn!("knowledge index not loaded; returning no documents");
            return Vec::new();
        };
        if generation.documents.is_empty() {
            warn!(generation = generation.generation, "knowledge index is empty");
            return Vec::new();
        }
        let query = self.embedder.embed(text);
        let results = rank(&generation.documents, &query, k, self.options.min_relevance);
        debug!(
            generation = generation.generation,
            requested = k,
            returned = results.len(),
            "knowledge retrieved"
        );
        results
    }
}

fn rank(documents: &[KnowledgeDocument], query: &[f32], k: usize, floor: f32) -> Vec<ScoredDocument> {
    let mut scored: Vec<(f32, &KnowledgeDocument)> = documents
        .iter()
        .map(|document| (cosine_similarity(query, &document.embedding), document))
        .filter(|(score, _)| *score > 0.0 && *score >= floor)
        .collect();
    scored.sort_by(|(left_score, left), (right_score, right)| {
        right_score
            .partial_cmp(left_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.id.cmp(&right.id))
    });
    scored
        .into_iter()
        .take(k)
        .map(|(score, document)| ScoredDocument {
            score,
            document: document.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::embed::HashingEmbedder;
    use ddi_store::models::DocumentCategory;

    fn document(embedder: &HashingEmbedder, id: &str, body: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            id: id.to_string(),
            body: body.to_string(),
            category: DocumentCategory::Attribute,
            resource_type: None,
            attribute_name: None,
            embedding: embedder.embed(body),
        }
    }

    fn retriever() -> (SemanticRetriever, HashingEmbedder) {
        let embedder = HashingEmbedder::default();
        (SemanticRetriever::new(KnowledgeIndex::new(), Arc::new(embedder)), embedder)
    }

    #[tokio::test]
    async fn unloaded_and_empty_index_return_nothing() {
        let (retriever, _) = retriever();
        assert!(retriever.retrieve("networks", None).await.is_empty());
        retriever.index().install(1, Vec::new()).await;
        assert!(retriever.retrieve("networks", None).await.is_empty());
    }

    #[tokio::test]
    async fn ranks_by_similarity_and_breaks_ties_by_id() {
        let (retriever, embedder) = retriever();
        retriever
            .index()
            .install(
                1,
                vec![
                    document(&embedder, "b_twin", "MARSHA attribute filter"),
                    document(&embedder, "a_twin", "MARSHA attribute filter"),
                    document(&embedder, "dhcp", "DHCP lease failover timing"),
                    document(&embedder, "partial", "MARSHA site code"),
                ],
            )
            .await;
        let results = retriever.retrieve("MARSHA attribute filter", Some(3)).await;
        let ids: Vec<&str> = results.iter().map(|hit| hit.document.id.as_str()).collect();
        assert_eq!(ids, vec!["a_twin", "b_twin", "partial"]);
        assert!(results[0].score >= results[2].score);
    }

    #[tokio::test]
    async fn floor_and_cap_limit_results() {
        let embedder = HashingEmbedder::default();
        let retriever = SemanticRetriever::new(KnowledgeIndex::new(), Arc::new(embedder))
            .with_options(RetrievalOptions::default().with_min_relevance(0.99));
        retriever
            .index()
            .install(
                1,
                vec![
                    document(&embedder, "exact", "zone delegation"),
                    document(&embedder, "loose", "zone delegation and forwarding rules"),
                ],
            )
            .await;
        let results = retriever.retrieve("zone delegation", Some(500)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "exact");
        assert_eq!(RetrievalOptions::default().resolve_k(Some(500)), MAX_TOP_K);
        assert!(retriever.retrieve("zone delegation", Some(0)).await.is_empty());
    }

    #[tokio::test]
    async fn older_generation_never_replaces_newer() {
        let (retriever, embedder) = retriever();
        let index = retriever.index();
        assert!(index.install(2, vec![document(&embedder, "new", "network views")]).await);
        assert!(!index.install(1, vec![document(&embedder, "old", "network views")]).await);

        let current = index.current().await.expect("installed");
        assert_eq!(current.generation, 2);
        assert_eq!(current.documents[0].id, "new");
        assert!(index.install(2, Vec::new()).await);
    }
}
