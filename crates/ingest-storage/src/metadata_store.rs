//! Tile metadata/search store using PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use ingest_common::{BoundingBox, IngestError, IngestResult, Tile, TileSpec, TileStats, TileSummary};

use crate::retry::RetryPolicy;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tile_metadata (
    tile_id      UUID PRIMARY KEY,
    dataset      TEXT NOT NULL,
    granule      TEXT NOT NULL,
    section_spec TEXT NOT NULL,
    min_lat      DOUBLE PRECISION,
    max_lat      DOUBLE PRECISION,
    min_lon      DOUBLE PRECISION,
    max_lon      DOUBLE PRECISION,
    stat_min     DOUBLE PRECISION,
    stat_max     DOUBLE PRECISION,
    stat_mean    DOUBLE PRECISION,
    stat_count   BIGINT,
    ingested_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS tile_metadata_dataset_idx
    ON tile_metadata (dataset);
CREATE INDEX IF NOT EXISTS tile_metadata_granule_idx
    ON tile_metadata (dataset, granule)
"#;

/// Where searchable tile summaries are written.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Verify the store is reachable. Failing this blocks startup.
    async fn health_check(&self) -> IngestResult<()>;

    /// Write a run's summaries in one batched flush.
    async fn save_batch(&self, tiles: &[Tile]) -> IngestResult<()>;

    /// Write one summary. Convenience over `save_batch`.
    async fn save_data(&self, tile: &Tile) -> IngestResult<()> {
        self.save_batch(std::slice::from_ref(tile)).await
    }
}

/// PostgreSQL-backed metadata store. Rows are keyed by tile id and
/// upserted, so a re-ingested granule converges on one row per tile.
pub struct PostgresMetadataStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresMetadataStore {
    /// Connect and bootstrap the schema. Fails when the database is
    /// unreachable.
    pub async fn connect(database_url: &str, retry: RetryPolicy) -> IngestResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| IngestError::connection("metadata store", e))?;

        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&pool)
                    .await
                    .map_err(|e| {
                        IngestError::Metadata(format!("schema bootstrap failed: {}", e))
                    })?;
            }
        }

        Ok(Self { pool, retry })
    }

    async fn write_batch(&self, tiles: &[Tile]) -> IngestResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IngestError::Metadata(format!("begin failed: {}", e)))?;

        for tile in tiles {
            let s = &tile.summary;
            sqlx::query(
                r#"
                INSERT INTO tile_metadata (
                    tile_id, dataset, granule, section_spec,
                    min_lat, max_lat, min_lon, max_lon,
                    stat_min, stat_max, stat_mean, stat_count,
                    ingested_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (tile_id)
                DO UPDATE SET
                    granule = EXCLUDED.granule,
                    section_spec = EXCLUDED.section_spec,
                    min_lat = EXCLUDED.min_lat,
                    max_lat = EXCLUDED.max_lat,
                    min_lon = EXCLUDED.min_lon,
                    max_lon = EXCLUDED.max_lon,
                    stat_min = EXCLUDED.stat_min,
                    stat_max = EXCLUDED.stat_max,
                    stat_mean = EXCLUDED.stat_mean,
                    stat_count = EXCLUDED.stat_count,
                    ingested_at = EXCLUDED.ingested_at
                "#,
            )
            .bind(s.tile_id)
            .bind(&s.dataset_name)
            .bind(&s.granule)
            .bind(s.section_spec.to_string())
            .bind(s.bbox.map(|b| b.min_lat))
            .bind(s.bbox.map(|b| b.max_lat))
            .bind(s.bbox.map(|b| b.min_lon))
            .bind(s.bbox.map(|b| b.max_lon))
            .bind(s.stats.map(|st| st.min))
            .bind(s.stats.map(|st| st.max))
            .bind(s.stats.map(|st| st.mean))
            .bind(s.stats.map(|st| st.count as i64))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| IngestError::Metadata(format!("insert failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| IngestError::Metadata(format!("commit failed: {}", e)))?;
        Ok(())
    }

    /// Recent tile summaries for a dataset, newest first.
    pub async fn find_by_dataset(
        &self,
        dataset: &str,
        limit: i64,
    ) -> IngestResult<Vec<TileSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT tile_id, dataset, granule, section_spec,
                   min_lat, max_lat, min_lon, max_lon,
                   stat_min, stat_max, stat_mean, stat_count
            FROM tile_metadata
            WHERE dataset = $1
            ORDER BY ingested_at DESC
            LIMIT $2
            "#,
        )
        .bind(dataset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Metadata(format!("query failed: {}", e)))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let bbox = match (
                row.get::<Option<f64>, _>("min_lat"),
                row.get::<Option<f64>, _>("max_lat"),
                row.get::<Option<f64>, _>("min_lon"),
                row.get::<Option<f64>, _>("max_lon"),
            ) {
                (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => {
                    Some(BoundingBox::new(min_lat, max_lat, min_lon, max_lon))
                }
                _ => None,
            };
            let stats = match (
                row.get::<Option<f64>, _>("stat_min"),
                row.get::<Option<f64>, _>("stat_max"),
                row.get::<Option<f64>, _>("stat_mean"),
                row.get::<Option<i64>, _>("stat_count"),
            ) {
                (Some(min), Some(max), Some(mean), Some(count)) => Some(TileStats {
                    min,
                    max,
                    mean,
                    count: count as u64,
                }),
                _ => None,
            };

            summaries.push(TileSummary {
                tile_id: row.get::<Uuid, _>("tile_id"),
                dataset_name: row.get::<String, _>("dataset"),
                granule: row.get::<String, _>("granule"),
                section_spec: TileSpec::parse(&row.get::<String, _>("section_spec"))?,
                bbox,
                stats,
            });
        }

        Ok(summaries)
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn health_check(&self) -> IngestResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::connection("metadata store", e))?;
        Ok(())
    }

    #[instrument(skip(self, tiles), fields(tiles = tiles.len()))]
    async fn save_batch(&self, tiles: &[Tile]) -> IngestResult<()> {
        self.retry
            .run("metadata store", || self.write_batch(tiles))
            .await?;
        debug!("Wrote tile metadata batch");
        Ok(())
    }
}
