//! PostgreSQL catalog: datasets, parameter mappings and measurements.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use obs_common::{Dataset, DatasetId, Mapping, MappingProvenance, Measurement, Namespace};

use crate::datasets::DatasetRegistry;
use crate::error::{StoreError, StoreResult};
use crate::mappings::{InsertOutcome, MappingStore};
use crate::measurements::{BatchOutcome, MeasurementSink};

/// Columns bound per measurement row; Postgres caps a statement at 65535 binds.
const MEASUREMENT_COLUMNS: usize = 11;

/// Largest batch a single INSERT can carry.
pub const MAX_BATCH_ROWS: usize = u16::MAX as usize / MEASUREMENT_COLUMNS;

/// Database connection pool and catalog operations.
///
/// One pooled connection is checked out per batch write.
#[derive(Clone)]
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    /// Create a new catalog connection from database URL.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::Query(msg) => StoreError::Connectivity(msg),
                other => other,
            })?;

        info!(max_connections, "Connected to catalog database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&self.pool).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DatasetRegistry for Catalog {
    async fn register(&self, dataset: &Dataset) -> StoreResult<DatasetId> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO datasets (id, name, path, external_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name)
            DO UPDATE SET rescanned_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&dataset.name)
        .bind(dataset.path.to_string_lossy().as_ref())
        .bind(&dataset.external_id)
        .fetch_one(&self.pool)
        .await?;

        debug!(dataset = %dataset.name, id = %id, "Registered dataset");
        Ok(id)
    }

    async fn clear_measurements(&self, dataset_id: DatasetId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM measurements WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MappingStore for Catalog {
    async fn get(&self, raw_name: &str) -> StoreResult<Option<Mapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT raw_name, standard_code, namespace, unit, description, provenance \
             FROM parameter_mappings WHERE raw_name = $1",
        )
        .bind(obs_common::normalize_raw_name(raw_name))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Mapping::try_from).transpose()
    }

    async fn insert_if_absent(&self, mapping: &Mapping) -> StoreResult<InsertOutcome> {
        let mapping = mapping.clone().normalized();
        // Conflict resolution happens in the database: first writer wins.
        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO parameter_mappings (
                raw_name, standard_code, namespace, unit, description, provenance
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (raw_name) DO NOTHING
            RETURNING raw_name
            "#,
        )
        .bind(&mapping.raw_name)
        .bind(&mapping.standard_code)
        .bind(mapping.namespace.as_str())
        .bind(&mapping.unit)
        .bind(&mapping.description)
        .bind(mapping.provenance.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(InsertOutcome {
                mapping,
                created: true,
            });
        }

        let existing = self.get(&mapping.raw_name).await?.ok_or_else(|| {
            StoreError::Query(format!(
                "mapping '{}' conflicted but could not be read back",
                mapping.raw_name
            ))
        })?;
        Ok(InsertOutcome {
            mapping: existing,
            created: false,
        })
    }

    async fn update_unit(
        &self,
        raw_name: &str,
        unit: &str,
        description: Option<&str>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE parameter_mappings
            SET unit = $2,
                description = COALESCE($3, description),
                provenance = 'curated',
                updated_at = NOW()
            WHERE raw_name = $1
            "#,
        )
        .bind(obs_common::normalize_raw_name(raw_name))
        .bind(unit)
        .bind(description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn all(&self) -> StoreResult<Vec<Mapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT raw_name, standard_code, namespace, unit, description, provenance \
             FROM parameter_mappings ORDER BY raw_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Mapping::try_from).collect()
    }
}

#[async_trait]
impl MeasurementSink for Catalog {
    async fn write_batch(&self, batch: &[Measurement]) -> StoreResult<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        if batch.len() > MAX_BATCH_ROWS {
            return Err(StoreError::Query(format!(
                "batch of {} rows exceeds the {} row statement limit",
                batch.len(),
                MAX_BATCH_ROWS
            )));
        }

        let mut tx = self.pool.begin().await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO measurements (\
                time, dataset_id, standard_code, namespace, value, unit, quality_flag, \
                latitude, longitude, depth, location_key) ",
        );
        builder.push_values(batch, |mut row, m| {
            let location = m.location.clone().unwrap_or_default();
            row.push_bind(m.timestamp)
                .push_bind(m.dataset_id)
                .push_bind(&m.standard_code)
                .push_bind(m.namespace.as_str())
                .push_bind(m.value)
                .push_bind(&m.unit)
                .push_bind(i16::from(m.quality_flag.0))
                .push_bind(location.latitude)
                .push_bind(location.longitude)
                .push_bind(location.depth)
                .push_bind(m.location_key());
        });
        builder.push(
            " ON CONFLICT (time, standard_code, namespace, dataset_id, location_key) DO NOTHING",
        );

        let result = builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        let inserted = result.rows_affected() as usize;
        Ok(BatchOutcome {
            inserted,
            duplicates: batch.len().saturating_sub(inserted),
        })
    }

    async fn count(&self, dataset_id: DatasetId) -> StoreResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM measurements WHERE dataset_id = $1")
                .bind(dataset_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}

/// Database row for parameter mappings.
#[derive(Debug, FromRow)]
struct MappingRow {
    raw_name: String,
    standard_code: String,
    namespace: String,
    unit: String,
    description: Option<String>,
    provenance: String,
}

impl TryFrom<MappingRow> for Mapping {
    type Error = StoreError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        let namespace: Namespace = row.namespace.parse().map_err(|e| StoreError::CorruptRow {
            table: "parameter_mappings",
            message: format!("{}", e),
        })?;
        Ok(Mapping {
            raw_name: row.raw_name,
            standard_code: row.standard_code,
            namespace,
            unit: row.unit,
            description: row.description,
            provenance: MappingProvenance::from_db(&row.provenance),
        })
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    external_id TEXT,
    registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    rescanned_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS parameter_mappings (
    raw_name TEXT PRIMARY KEY,
    standard_code TEXT NOT NULL,
    namespace VARCHAR(16) NOT NULL,
    unit TEXT NOT NULL,
    description TEXT,
    provenance VARCHAR(16) NOT NULL DEFAULT 'seed',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_mappings_standard_code ON parameter_mappings(standard_code);

CREATE TABLE IF NOT EXISTS measurements (
    id BIGSERIAL PRIMARY KEY,
    time TIMESTAMPTZ NOT NULL,
    dataset_id UUID NOT NULL REFERENCES datasets(id),
    standard_code TEXT NOT NULL,
    namespace VARCHAR(16) NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    unit TEXT NOT NULL,
    quality_flag SMALLINT NOT NULL,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    depth DOUBLE PRECISION,
    location_key TEXT NOT NULL DEFAULT '',
    ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    UNIQUE(time, standard_code, namespace, dataset_id, location_key)
);

CREATE INDEX IF NOT EXISTS idx_measurements_dataset_param_time
    ON measurements(dataset_id, standard_code, time DESC)
"#;
