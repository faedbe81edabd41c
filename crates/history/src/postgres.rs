//! PostgreSQL-backed ingestion history: one document row per granule,
//! keyed by a stable fingerprint, plus one latest-update row per dataset.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use ingest_common::{IngestError, IngestResult};

use crate::HistoryStore;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS granule_history (
    fingerprint TEXT PRIMARY KEY,
    dataset_id  TEXT NOT NULL,
    file_name   TEXT NOT NULL,
    signature   TEXT NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS granule_history_dataset_idx
    ON granule_history (dataset_id);
CREATE TABLE IF NOT EXISTS dataset_latest (
    dataset_id   TEXT PRIMARY KEY,
    latest_mtime DOUBLE PRECISION NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL
)
"#;

/// Remote document store for ingestion history. Construction probes
/// reachability and bootstraps the schema; an unreachable database is a
/// fatal construction error.
pub struct PostgresHistoryStore {
    pool: PgPool,
    dataset_id: String,
}

impl PostgresHistoryStore {
    pub async fn connect(database_url: &str, dataset_id: &str) -> IngestResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .map_err(|e| IngestError::connection("history store", e))?;

        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&pool)
                    .await
                    .map_err(|e| IngestError::History(format!("schema bootstrap failed: {}", e)))?;
            }
        }

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| IngestError::connection("history store", e))?;

        info!(dataset = %dataset_id, "Connected ingestion history document store");
        Ok(Self {
            pool,
            dataset_id: dataset_id.to_string(),
        })
    }

    /// Stable document key for one granule of one dataset.
    fn fingerprint(&self, file_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dataset_id.as_bytes());
        hasher.update(file_name.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn lookup(&self, file_name: &str) -> IngestResult<Option<String>> {
        let row = sqlx::query("SELECT signature FROM granule_history WHERE fingerprint = $1")
            .bind(self.fingerprint(file_name))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IngestError::History(format!("lookup failed: {}", e)))?;

        Ok(row.map(|r| r.get::<String, _>("signature")))
    }

    async fn push(&self, file_name: &str, signature: &str) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO granule_history (fingerprint, dataset_id, file_name, signature, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (fingerprint)
            DO UPDATE SET signature = EXCLUDED.signature, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(self.fingerprint(file_name))
        .bind(&self.dataset_id)
        .bind(file_name)
        .bind(signature)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::History(format!("push failed: {}", e)))?;

        Ok(())
    }

    async fn latest_mtime(&self) -> IngestResult<Option<f64>> {
        let row = sqlx::query("SELECT latest_mtime FROM dataset_latest WHERE dataset_id = $1")
            .bind(&self.dataset_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IngestError::History(format!("latest_mtime lookup failed: {}", e)))?;

        Ok(row.map(|r| r.get::<f64, _>("latest_mtime")))
    }

    async fn push_latest_mtime(&self, seconds: f64) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_latest (dataset_id, latest_mtime, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (dataset_id)
            DO UPDATE SET latest_mtime = EXCLUDED.latest_mtime, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&self.dataset_id)
        .bind(seconds)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::History(format!("latest_mtime push failed: {}", e)))?;

        Ok(())
    }

    async fn close(&self) -> IngestResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fingerprint_is_stable_and_distinct() {
        let store_a = PostgresHistoryStore {
            pool: PgPool::connect_lazy("postgres://localhost/none").unwrap(),
            dataset_id: "avhrr_oi".to_string(),
        };
        let store_b = PostgresHistoryStore {
            pool: PgPool::connect_lazy("postgres://localhost/none").unwrap(),
            dataset_id: "mur_sst".to_string(),
        };

        assert_eq!(
            store_a.fingerprint("g1.json"),
            store_a.fingerprint("g1.json")
        );
        assert_ne!(
            store_a.fingerprint("g1.json"),
            store_a.fingerprint("g2.json")
        );
        assert_ne!(
            store_a.fingerprint("g1.json"),
            store_b.fingerprint("g1.json")
        );
    }
}
