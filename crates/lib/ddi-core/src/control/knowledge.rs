use serde::Serialize;
use surrealdb::Connection;
use tracing::{debug, info, warn};

use crate::knowledge::{KnowledgeError, ScoredDocument, load_curated_examples};

use super::{ControlError, DdiControlPlane};

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeRebuildReport {
    pub generation: i64,
    pub documents: usize,
    pub resource_types: usize,
    pub attributes: usize,
    pub curated_examples: usize,
    pub warnings: Vec<String>,
}

impl<C: Connection> DdiControlPlane<C> {
    /// Returns the most relevant knowledge documents for `text`.
    ///
    /// Never fails: an unreachable store or empty index yields no documents.
    pub async fn retrieve(&self, text: &str, k: Option<usize>) -> Vec<ScoredDocument> {
        self.ensure_index_loaded().await;
        self.retriever.retrieve(text, k).await
    }

    /// Rebuilds the knowledge base from the live schema snapshot.
    ///
    /// Documents are written to a fresh generation, the in-memory index is
    /// swapped to it, and older generations are pruned. Unavailable attribute
    /// definitions or curated examples are reported as warnings.
    ///
    /// # Errors
    /// Returns `ControlError::Knowledge` if no snapshot is installed or the
    /// new generation cannot be written.
    pub async fn rebuild_knowledge(&self) -> Result<KnowledgeRebuildReport, ControlError> {
        let _rebuild = self.rebuild_lock.lock().await;
        let live = self.maintainer.handle().current().await;
        if live.snapshot.is_empty() {
            return Err(KnowledgeError::EmptySnapshot.into());
        }

        let mut warnings = Vec::new();
        let attributes = match self
            .maintainer
            .discovery()
            .source()
            .fetch_attribute_definitions()
            .await
        {
            Ok(attributes) => attributes,
            Err(err) => {
                warn!(error = %err, "attribute definitions unavailable; building without them");
                warnings.push(KnowledgeError::from(err).to_string());
                Vec::new()
            }
        };
        let curated = match &self.curated_path {
            Some(path) => match load_curated_examples(path).await {
                Ok(curated) => curated,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping curated examples");
                    warnings.push(err.to_string());
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let documents = self.builder.build(&live.snapshot, &attributes, &curated);
        let generation = self.store.latest_generation().await?.map_or(1, |latest| latest + 1);
        let written = self.store.write_generation(generation, documents.clone()).await?;
        self.retriever.index().install(generation, documents).await;
        if let Err(err) = self.store.prune_except(generation).await {
            warn!(generation, error = %err, "failed to prune old knowledge generations");
            warnings.push(err.to_string());
        }

        info!(
            generation,
            documents = written,
            attributes = attributes.len(),
            curated = curated.len(),
            "knowledge base rebuilt"
        );
        Ok(KnowledgeRebuildReport {
            generation,
            documents: written,
            resource_types: live.snapshot.len(),
            attributes: attributes.len(),
            curated_examples: curated.len(),
            warnings,
        })
    }

    /// Loads the newest committed generation into the index on first use.
    ///
    /// Runs without the rebuild lock, so a retrieval during a slow rebuild
    /// serves the previous generation instead of waiting. The index never
    /// swaps back to an older generation, so a late load cannot undo a
    /// rebuild that finished first.
    async fn ensure_index_loaded(&self) {
        let index = self.retriever.index();
        if index.is_loaded().await {
            return;
        }
        let latest = match self.store.latest_generation().await {
            Ok(Some(latest)) => latest,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "knowledge store unavailable");
                return;
            }
        };
        match self.store.load_generation(latest).await {
            Ok(documents) if documents.is_empty() => {
                debug!(generation = latest, "knowledge generation pruned before load");
            }
            Ok(documents) => {
                let count = documents.len();
                if index.install(latest, documents).await {
                    info!(generation = latest, documents = count, "knowledge index loaded");
                }
            }
            Err(err) => warn!(generation = latest, error = %err, "failed to load knowledge generation"),
        }
    }
}
