//! Integration tests for the SQLite fact graph
//!
//! Tests triple persistence using in-memory and file-backed databases.

use std::sync::Arc;
use tempfile::TempDir;

use multihop_reasoning::config::DatabaseConfig;
use multihop_reasoning::storage::{GraphStore, SqliteStorage, Triple};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn file_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("nested").join("graph.db"),
        max_connections: 4,
    }
}

#[cfg(test)]
mod triple_tests {
    use super::*;

    #[tokio::test]
    async fn test_stored_twice_keeps_one_edge() {
        let storage = create_test_storage().await;
        let triple = Triple::new("Albert Einstein", "worked_at", "Princeton University");

        storage.upsert_triples(&[triple.clone()]).await.unwrap();
        storage.upsert_triples(&[triple.clone()]).await.unwrap();

        assert_eq!(storage.count_edge(&triple).await.unwrap(), 1);
        assert_eq!(storage.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_predicate_case_is_normalized() {
        let storage = create_test_storage().await;

        storage
            .upsert_triple(&Triple::new("Albert Einstein", "Worked At", "Princeton University"))
            .await
            .unwrap();
        let created = storage
            .upsert_triple(&Triple::new("Albert Einstein", "worked_at", "Princeton University"))
            .await
            .unwrap();

        assert!(!created);
        assert_eq!(storage.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_entities_different_predicates_are_distinct() {
        let storage = create_test_storage().await;
        let created = storage
            .upsert_triples(&[
                Triple::new("Marie Curie", "discovered", "Radium"),
                Triple::new("Marie Curie", "isolated", "Radium"),
            ])
            .await
            .unwrap();

        assert_eq!(created, 2);
        assert_eq!(storage.edges_of("Radium").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let storage = create_test_storage().await;
        assert_eq!(storage.upsert_triples(&[]).await.unwrap(), 0);
    }
}

#[cfg(test)]
mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_graph_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage.ping().await.unwrap();
            storage
                .upsert_triple(&Triple::new("Albert Einstein", "born_in", "Ulm"))
                .await
                .unwrap();
            storage.close().await;
        }

        let storage = SqliteStorage::new(&config).await.unwrap();
        assert!(storage.has_entity("Ulm").await.unwrap());
        assert_eq!(storage.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn GraphStore> = Arc::new(SqliteStorage::new(&file_config(&dir)).await.unwrap());
        let triples = vec![
            Triple::new("Albert Einstein", "worked_at", "Princeton University"),
            Triple::new("Princeton University", "located_in", "New Jersey"),
        ];

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let storage = storage.clone();
                let triples = triples.clone();
                tokio::spawn(async move { storage.upsert_triples(&triples).await })
            })
            .collect();

        let mut created = 0;
        for writer in writers {
            created += writer.await.unwrap().unwrap();
        }

        assert_eq!(created, 2);
        assert_eq!(storage.edge_count().await.unwrap(), 2);
    }
}
