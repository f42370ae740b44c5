//! Fact-graph construction from retrieved documents.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::extraction::TripleExtractor;
use crate::storage::{GraphStore, Triple};

/// Extracts triples from documents and merges them into a [`GraphStore`].
pub struct FactGraphBuilder {
    extractor: TripleExtractor,
    store: Option<Arc<dyn GraphStore>>,
}

impl Default for FactGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FactGraphBuilder {
    /// Create a builder that is not yet bound to a store
    pub fn new() -> Self {
        Self {
            extractor: TripleExtractor::new(),
            store: None,
        }
    }

    /// Bind the builder to a graph store.
    pub fn initialize(&mut self, store: Arc<dyn GraphStore>) {
        self.store = Some(store);
    }

    /// Whether a store has been bound.
    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    /// Extract triples from one document.
    pub fn extract(&self, text: &str) -> Vec<Triple> {
        self.extractor.extract(text)
    }

    /// Merge triples into the store. Returns the number of new edges.
    pub async fn store(&self, triples: &[Triple]) -> AppResult<u64> {
        let store = self.store.as_ref().ok_or_else(|| AppError::NotInitialized {
            component: "FactGraphBuilder".to_string(),
        })?;

        let created = store
            .upsert_triples(triples)
            .await
            .map_err(AppError::graph_unavailable)?;

        debug!(
            submitted = triples.len(),
            created = created,
            "Stored triples"
        );
        Ok(created)
    }

    /// Extract and store triples for every document, returning all extracted triples.
    pub async fn build<S: AsRef<str>>(&self, documents: &[S]) -> AppResult<Vec<Triple>> {
        let start = Instant::now();

        let triples: Vec<Triple> = documents
            .iter()
            .flat_map(|doc| self.extract(doc.as_ref()))
            .collect();

        let created = self.store(&triples).await?;

        info!(
            documents = documents.len(),
            triples = triples.len(),
            new_edges = created,
            latency_ms = start.elapsed().as_millis(),
            "Fact graph updated"
        );
        Ok(triples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn initialized_builder() -> (FactGraphBuilder, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let mut builder = FactGraphBuilder::new();
        builder.initialize(storage.clone());
        (builder, storage)
    }

    #[tokio::test]
    async fn test_store_before_initialize_fails() {
        let builder = FactGraphBuilder::new();
        let err = builder
            .store(&[Triple::new("A", "knows", "B")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn test_store_twice_keeps_one_edge() {
        let (builder, storage) = initialized_builder().await;
        let triple = Triple::new("Albert Einstein", "worked_at", "Princeton University");

        builder.store(&[triple.clone()]).await.unwrap();
        builder.store(&[triple.clone()]).await.unwrap();

        assert_eq!(storage.count_edge(&triple).await.unwrap(), 1);
        assert_eq!(storage.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_build_concatenates_extractions() {
        let (builder, storage) = initialized_builder().await;
        let docs = [
            "Albert Einstein was born in Ulm.",
            "Marie Curie discovered Radium.",
            "Albert Einstein was born in Ulm.",
        ];

        let triples = builder.build(&docs).await.unwrap();
        assert_eq!(triples.len(), 3);
        assert_eq!(storage.edge_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_build_with_no_triples() {
        let (builder, storage) = initialized_builder().await;
        let triples = builder.build(&["nothing to see here"]).await.unwrap();
        assert!(triples.is_empty());
        assert_eq!(storage.edge_count().await.unwrap(), 0);
    }
}
