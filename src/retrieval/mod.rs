//! Hybrid retrieval: BM25 lexical ranking fused with dense embedding ranking.
//!
//! - [`Bm25Index`]: sparse term-frequency / inverse-document-frequency scoring
//! - [`DenseIndex`]: cosine similarity over [`Embedder`] vectors, from a
//!   fastembed model when `EMBEDDING_MODEL` is set and the `fastembed`
//!   feature is enabled, feature hashing otherwise
//! - [`fusion`]: min-max or reciprocal-rank fusion of the two lists
//!
//! Documents are identified by [`doc_id`], a stable hash of their content.

mod dense;
pub mod fusion;
mod lexical;
#[cfg(feature = "fastembed")]
mod neural;

pub use dense::*;
pub use lexical::Bm25Index;
#[cfg(feature = "fastembed")]
pub use neural::FastEmbedder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{FusionStrategy, RetrievalConfig};
use crate::error::{AppError, AppResult};

/// Which ranker produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    /// Sparse lexical (BM25) ranking.
    Lexical,
    /// Dense embedding ranking.
    Dense,
}

/// A ranked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// De-duplication key: stable hash of `content`.
    pub doc_id: String,
    /// Document text.
    pub content: String,
    /// Ranking score (fused scores after [`HybridRetriever::search`]).
    pub score: f64,
    /// Ranker that produced the record.
    pub source: RetrievalSource,
}

impl RetrievedDocument {
    /// Create a document record, deriving its id from the content.
    pub fn new(content: impl Into<String>, score: f64, source: RetrievalSource) -> Self {
        let content = content.into();
        Self {
            doc_id: doc_id(&content),
            content,
            score,
            source,
        }
    }
}

/// Stable content hash: first 16 hex chars of SHA-256.
pub fn doc_id(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Document retrieval source: `top_k(query) -> documents`.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `top_k` documents with unique `doc_id`s, best first.
    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<RetrievedDocument>>;

    /// Names of the rankers behind [`search`](Self::search).
    fn methods(&self) -> Vec<String> {
        Vec::new()
    }
}

struct HybridIndex {
    documents: Vec<String>,
    lexical: Bm25Index,
    dense: DenseIndex,
}

/// Lexical + dense retriever over an externally supplied corpus.
pub struct HybridRetriever {
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    index: Option<HybridIndex>,
}

impl HybridRetriever {
    /// Create a retriever using the feature-hashing embedder.
    pub fn new(config: RetrievalConfig) -> Self {
        let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimensions));
        Self::with_embedder(config, embedder)
    }

    /// Create a retriever with the embedder `config` selects.
    ///
    /// Loading a neural model blocks while files download.
    pub fn from_config(config: RetrievalConfig) -> AppResult<Self> {
        let embedder = embedder_for(&config)?;
        Ok(Self::with_embedder(config, embedder))
    }

    /// Create a retriever with a custom embedder.
    pub fn with_embedder(config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            index: None,
        }
    }

    /// Index the corpus. Replaces any previous index.
    pub fn initialize(&mut self, documents: Vec<String>) {
        let start = Instant::now();
        let lexical = Bm25Index::build(&documents, self.config.bm25_k1, self.config.bm25_b);
        let dense = DenseIndex::build(&documents, self.embedder.as_ref());

        info!(
            documents = documents.len(),
            dimensions = self.embedder.dimensions(),
            latency_ms = start.elapsed().as_millis(),
            "Hybrid retriever initialized"
        );

        self.index = Some(HybridIndex {
            documents,
            lexical,
            dense,
        });
    }

    /// Whether [`initialize`](Self::initialize) has been called.
    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, |i| i.documents.len())
    }

    /// Whether no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run both rankers and fuse their results.
    pub fn hybrid_search(&self, query: &str, top_k: usize) -> AppResult<Vec<RetrievedDocument>> {
        let index = self.index.as_ref().ok_or_else(|| AppError::NotReady {
            component: "HybridRetriever".to_string(),
        })?;

        if top_k == 0 {
            return Err(AppError::Validation {
                field: "top_k".to_string(),
                reason: "top_k must be at least 1".to_string(),
            });
        }

        if index.documents.is_empty() {
            return Ok(Vec::new());
        }

        let to_docs = |ranked: Vec<(usize, f64)>, source: RetrievalSource| {
            ranked
                .into_iter()
                .map(|(i, score)| RetrievedDocument::new(index.documents[i].clone(), score, source))
                .collect::<Vec<_>>()
        };

        let lexical = to_docs(index.lexical.rank(query, top_k), RetrievalSource::Lexical);
        let query_vector = self.embedder.embed(query);
        let dense = to_docs(index.dense.rank(&query_vector, top_k), RetrievalSource::Dense);

        debug!(
            lexical = lexical.len(),
            dense = dense.len(),
            "Ranked candidates"
        );

        let fused = match self.config.fusion {
            FusionStrategy::ReciprocalRank => {
                fusion::fuse_rrf(lexical, dense, self.config.rrf_k, top_k)
            }
            FusionStrategy::MinMax => fusion::fuse_min_max(lexical, dense, top_k),
        };

        Ok(fused)
    }
}

/// Embedder named by `config.embedding_model`, or feature hashing.
pub fn embedder_for(config: &RetrievalConfig) -> AppResult<Arc<dyn Embedder>> {
    match config.embedding_model.as_deref() {
        None => Ok(Arc::new(HashingEmbedder::new(config.embedding_dimensions))),
        #[cfg(feature = "fastembed")]
        Some(model) => Ok(Arc::new(FastEmbedder::new(model)?)),
        #[cfg(not(feature = "fastembed"))]
        Some(model) => {
            tracing::warn!(
                model = %model,
                "Built without the fastembed feature, using feature hashing"
            );
            Ok(Arc::new(HashingEmbedder::new(config.embedding_dimensions)))
        }
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<RetrievedDocument>> {
        self.hybrid_search(query, top_k)
    }

    fn methods(&self) -> Vec<String> {
        vec!["bm25".to_string(), format!("dense:{}", self.embedder.name())]
    }
}
