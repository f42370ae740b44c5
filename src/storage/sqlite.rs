use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{GraphStore, Triple};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed fact graph
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the graph database described by `config`
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                    message: format!("Failed to create database directory: {}", e),
                })?;
            }
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory graph for tests. A single pinned connection keeps the data alive.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; later queries fail with a connection error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn pool_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StorageError::Connection {
                message: e.to_string(),
            }
        }
        other => StorageError::Sqlx(other),
    }
}

const UPSERT_TRIPLE: &str = r#"
    INSERT INTO triples (subject, predicate, object, created_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT (subject, predicate, object) DO NOTHING
"#;

#[async_trait]
impl GraphStore for SqliteStorage {
    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(pool_error)?;
        Ok(())
    }

    async fn upsert_triple(&self, triple: &Triple) -> StorageResult<bool> {
        let result = sqlx::query(UPSERT_TRIPLE)
            .bind(&triple.subject)
            .bind(&triple.predicate)
            .bind(&triple.object)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(pool_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_triples(&self, triples: &[Triple]) -> StorageResult<u64> {
        if triples.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(pool_error)?;
        let now = Utc::now().to_rfc3339();
        let mut created = 0;

        for triple in triples {
            let result = sqlx::query(UPSERT_TRIPLE)
                .bind(&triple.subject)
                .bind(&triple.predicate)
                .bind(&triple.object)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(pool_error)?;
            created += result.rows_affected();
        }

        tx.commit().await.map_err(pool_error)?;

        debug!(
            submitted = triples.len(),
            created = created,
            "Merged triples into graph"
        );
        Ok(created)
    }

    async fn edges_of(&self, entity: &str) -> StorageResult<Vec<Triple>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT subject, predicate, object
            FROM triples
            WHERE subject = ? OR object = ?
            ORDER BY id ASC
            "#,
        )
        .bind(entity)
        .bind(entity)
        .fetch_all(&self.pool)
        .await
        .map_err(pool_error)?;

        Ok(rows
            .into_iter()
            .map(|(subject, predicate, object)| Triple {
                subject,
                predicate,
                object,
            })
            .collect())
    }

    async fn has_entity(&self, entity: &str) -> StorageResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM triples WHERE subject = ? OR object = ? LIMIT 1")
                .bind(entity)
                .bind(entity)
                .fetch_optional(&self.pool)
                .await
                .map_err(pool_error)?;

        Ok(row.is_some())
    }

    async fn edge_count(&self) -> StorageResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM triples")
            .fetch_one(&self.pool)
            .await
            .map_err(pool_error)?;

        Ok(count as u64)
    }

    async fn count_edge(&self, triple: &Triple) -> StorageResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM triples WHERE subject = ? AND predicate = ? AND object = ?",
        )
        .bind(&triple.subject)
        .bind(&triple.predicate)
        .bind(&triple.object)
        .fetch_one(&self.pool)
        .await
        .map_err(pool_error)?;

        Ok(count as u64)
    }
}
