//! Fact-graph storage layer.
//!
//! Triples are the only persisted graph data. Entities are implicit nodes keyed
//! by exact string identity; no alias resolution happens at this layer.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// A directed labeled edge `(subject, predicate, object)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Source entity.
    pub subject: String,
    /// Case-normalized relation label.
    pub predicate: String,
    /// Target entity.
    pub object: String,
}

impl Triple {
    /// Create a triple, normalizing the predicate.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl AsRef<str>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: normalize_predicate(predicate.as_ref()),
            object: object.into(),
        }
    }

    /// The endpoint opposite to `entity`, if `entity` is one of the endpoints.
    pub fn other_end(&self, entity: &str) -> Option<&str> {
        if self.subject == entity {
            Some(&self.object)
        } else if self.object == entity {
            Some(&self.subject)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.subject, self.predicate, self.object)
    }
}

/// Lowercase a relation label and join its words with `_`.
pub fn normalize_predicate(predicate: &str) -> String {
    predicate
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Queryable, append-only graph store.
///
/// Writes must be upserts keyed on `(subject, predicate, object)` so that
/// repeated extraction and retried writes stay idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> StorageResult<()>;

    /// Merge a single triple. Returns `true` if a new edge was created.
    async fn upsert_triple(&self, triple: &Triple) -> StorageResult<bool>;

    /// Merge a batch of triples. Returns the number of new edges.
    async fn upsert_triples(&self, triples: &[Triple]) -> StorageResult<u64>;

    /// All edges touching `entity`, in either direction.
    async fn edges_of(&self, entity: &str) -> StorageResult<Vec<Triple>>;

    /// Whether any edge mentions `entity`.
    async fn has_entity(&self, entity: &str) -> StorageResult<bool>;

    /// Total number of edges.
    async fn edge_count(&self) -> StorageResult<u64>;

    /// Number of stored edges equal to `triple` (0 or 1).
    async fn count_edge(&self, triple: &Triple) -> StorageResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_new_normalizes_predicate() {
        let triple = Triple::new("Albert Einstein", "Worked At", "Princeton University");
        assert_eq!(triple.predicate, "worked_at");
        assert_eq!(triple.subject, "Albert Einstein");
    }

    #[test]
    fn test_normalize_predicate_variants() {
        assert_eq!(normalize_predicate("BORN_IN"), "born_in");
        assert_eq!(normalize_predicate("  was   born-in "), "was_born_in");
        assert_eq!(normalize_predicate("developed"), "developed");
    }

    #[test]
    fn test_other_end() {
        let triple = Triple::new("Marie Curie", "discovered", "Radium");
        assert_eq!(triple.other_end("Marie Curie"), Some("Radium"));
        assert_eq!(triple.other_end("Radium"), Some("Marie Curie"));
        assert_eq!(triple.other_end("Warsaw"), None);
    }

    #[test]
    fn test_triple_display() {
        let triple = Triple::new("Marie Curie", "born_in", "Warsaw");
        assert_eq!(triple.to_string(), "Marie Curie -[born_in]-> Warsaw");
    }
}
