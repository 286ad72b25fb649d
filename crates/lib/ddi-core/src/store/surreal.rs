use std::{error::Error, fmt, sync::Arc};

use ddi_store::models::{KnowledgeDocument, KnowledgeRecord};
use ddi_store::schema::{TABLE_KNOWLEDGE_DOC, TABLE_KNOWLEDGE_GENERATION, make_record_key};
use serde::{Deserialize, Serialize};
use surrealdb::{Connection, Surreal};
use tracing::warn;

#[derive(Debug)]
pub enum StoreError {
    Surreal(Box<surrealdb::Error>),
    InvalidInput(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surreal(err) => write!(f, "SurrealDB error: {err}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Surreal(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Generation-tagged knowledge document storage.
pub struct SurrealKnowledgeStore<C: Connection> {
    db: Arc<Surreal<C>>,
}

impl<C: Connection> Clone for SurrealKnowledgeStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealKnowledgeStore<C> {
    #[must_use]
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db: Arc::new(db),
        }
    }

    #[must_use]
    pub const fn from_arc(db: Arc<Surreal<C>>) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn db(&self) -> &Surreal<C> {
        &self.db
    }

    /// Writes every document under the given generation, then commits it.
    ///
    /// A generation only becomes visible to `list_generations` once every
    /// document has landed. Leftover records from an earlier attempt at the
    /// same generation are cleared first, and a failed write removes what it
    /// had written.
    ///
    /// # Errors
    /// Returns `StoreError` if a document id is empty, the generation is
    /// negative, or a database write fails.
    pub async fn write_generation(
        &self,
        generation: i64,
        documents: Vec<KnowledgeDocument>,
    ) -> StoreResult<usize> {
        if generation < 0 {
            return Err(StoreError::InvalidInput(
                "generation must be non-negative".to_string(),
            ));
        }
        self.delete_generation(generation).await?;
        match self.write_documents(generation, documents).await {
            Ok(written) => {
                let marker = GenerationMarker {
                    generation,
                    documents: written,
                };
                let _: Option<GenerationMarker> = self
                    .db
                    .upsert((TABLE_KNOWLEDGE_GENERATION, generation.to_string()))
                    .content(marker)
                    .await?;
                Ok(written)
            }
            Err(err) => {
                if let Err(cleanup) = self.delete_generation(generation).await {
                    warn!(generation, error = %cleanup, "failed to remove partial knowledge generation");
                }
                Err(err)
            }
        }
    }

    async fn write_documents(
        &self,
        generation: i64,
        documents: Vec<KnowledgeDocument>,
    ) -> StoreResult<usize> {
        let mut written = 0;
        for document in documents {
            ensure_non_empty(&document.id, "doc_id")?;
            let key = make_record_key(generation, &document.id);
            let record = KnowledgeRecord::from_document(generation, document);
            let _: Option<KnowledgeRecord> = self
                .db
                .upsert((TABLE_KNOWLEDGE_DOC, key))
                .content(record)
                .await?;
            written += 1;
        }
        Ok(written)
    }

    /// Loads the documents of one generation, sorted by document id.
    ///
    /// # Errors
    /// Returns `StoreError` if the database query fails.
    pub async fn load_generation(&self, generation: i64) -> StoreResult<Vec<KnowledgeDocument>> {
        let query = "SELECT * FROM knowledge_doc WHERE generation = $generation;";
        let mut response = self
            .db
            .query(query)
            .bind(("generation", generation))
            .await?;
        let records: Vec<KnowledgeRecord> = response.take(0)?;
        let mut documents: Vec<KnowledgeDocument> = records
            .into_iter()
            .map(KnowledgeRecord::into_document)
            .collect();
        documents.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(documents)
    }

    /// Lists committed generations in ascending order.
    ///
    /// # Errors
    /// Returns `StoreError` if the database query fails.
    pub async fn list_generations(&self) -> StoreResult<Vec<i64>> {
        let query = "SELECT * FROM knowledge_generation;";
        let mut response = self.db.query(query).await?;
        let markers: Vec<GenerationMarker> = response.take(0)?;
        let mut generations: Vec<i64> = markers.into_iter().map(|marker| marker.generation).collect();
        generations.sort_unstable();
        generations.dedup();
        Ok(generations)
    }

    /// Returns the newest committed generation, if any.
    ///
    /// # Errors
    /// Returns `StoreError` if the database query fails.
    pub async fn latest_generation(&self) -> StoreResult<Option<i64>> {
        Ok(self.list_generations().await?.pop())
    }

    /// Deletes every generation other than the one given.
    ///
    /// # Errors
    /// Returns `StoreError` if the database query fails.
    pub async fn prune_except(&self, generation: i64) -> StoreResult<()> {
        let query = "DELETE knowledge_generation WHERE generation != $generation;\
                     DELETE knowledge_doc WHERE generation != $generation;";
        self.db
            .query(query)
            .bind(("generation", generation))
            .await?
            .check()?;
        Ok(())
    }

    async fn delete_generation(&self, generation: i64) -> StoreResult<()> {
        let query = "DELETE knowledge_generation WHERE generation = $generation;\
                     DELETE knowledge_doc WHERE generation = $generation;";
        self.db
            .query(query)
            .bind(("generation", generation))
            .await?
            .check()?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, field: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

/// Commit record written after a generation's documents.
#[derive(Serialize, Deserialize)]
struct GenerationMarker {
    generation: i64,
    documents: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_store::models::DocumentCategory;
    use surrealdb::engine::local::{Db, Mem};

    async fn store() -> SurrealKnowledgeStore<Db> {
        let db = Surreal::new::<Mem>(()).await.expect("in-memory db");
        db.use_ns("ddi").use_db("test").await.expect("namespace");
        SurrealKnowledgeStore::new(db)
    }

    fn document(id: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            id: id.to_string(),
            body: format!("body of {id}"),
            category: DocumentCategory::BestPractice,
            resource_type: None,
            attribute_name: None,
            embedding: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn generations_are_isolated_and_pruned() {
        let store = store().await;
        assert_eq!(store.latest_generation().await.expect("latest"), None);

        let written = store
            .write_generation(1, vec![document("b"), document("a")])
            .await
            .expect("write gen 1");
        assert_eq!(store.load_generation(1).await.expect("load gen 1").len(), written);
        store
            .write_generation(2, vec![document("c")])
            .await
            .expect("write gen 2");

        assert_eq!(store.list_generations().await.expect("list"), vec![1, 2]);
        let first = store.load_generation(1).await.expect("load gen 1");
        let ids: Vec<&str> = first.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(first[0], document("a"));

        store.prune_except(2).await.expect("prune");
        assert_eq!(store.list_generations().await.expect("list"), vec![2]);
        assert!(store.load_generation(1).await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn rewriting_a_generation_replaces_records() {
        let store = store().await;
        store.write_generation(3, vec![document("a")]).await.expect("write");
        store.write_generation(3, vec![document("a")]).await.expect("rewrite");
        assert_eq!(store.load_generation(3).await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_previous_generation_latest() {
        let store = store().await;
        store.write_generation(1, vec![document("a")]).await.expect("write gen 1");

        let err = store
            .write_generation(2, vec![document("c"), document(" "), document("d")])
            .await
            .expect_err("second document has no id");
        assert!(matches!(err, StoreError::InvalidInput(_)));

        assert_eq!(store.latest_generation().await.expect("latest"), Some(1));
        assert_eq!(store.list_generations().await.expect("list"), vec![1]);
        assert!(store.load_generation(2).await.expect("load gen 2").is_empty());
        assert_eq!(store.load_generation(1).await.expect("load gen 1").len(), 1);
    }

    #[tokio::test]
    async fn documents_without_commit_are_not_listed() {
        let store = store().await;
        let _: Option<KnowledgeRecord> = store
            .db()
            .upsert((TABLE_KNOWLEDGE_DOC, make_record_key(4, "orphan")))
            .content(KnowledgeRecord::from_document(4, document("orphan")))
            .await
            .expect("raw write");
        assert_eq!(store.latest_generation().await.expect("latest"), None);

        store.write_generation(4, vec![document("a")]).await.expect("write gen 4");
        let ids: Vec<String> = store
            .load_generation(4)
            .await
            .expect("load gen 4")
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn rejects_empty_document_id() {
        let store = store().await;
        let err = store
            .write_generation(1, vec![document(" ")])
            .await
            .expect_err("empty id");
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
