//! PostGIS-backed tile store

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;

use super::errors::{StoreError, StoreResult};
use super::TileStore;
use crate::config::DatabaseConfig;
use crate::sql::{SqlValue, Statement, TableRef};

/// Opens the bounded connection pool
pub async fn connect_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// Executes rendered statements on a pool. Each call checks a connection
/// out for its own duration only.
#[derive(Debug, Clone)]
pub struct PgTileStore {
    pool: PgPool,
}

impl PgTileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, stmt: &Statement) -> StoreResult<PgRow> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing");
        Ok(bind(sqlx::query(&stmt.sql), &stmt.params)
            .fetch_one(&self.pool)
            .await?)
    }
}

fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Bool(value) => query.bind(*value),
            SqlValue::Int(value) => query.bind(*value),
            SqlValue::Float(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.as_str()),
            SqlValue::Uuid(value) => query.bind(*value),
            SqlValue::Timestamp(value) => query.bind(wall_clock_utc(value)),
        };
    }
    query
}

/// Instants are bound as `timestamp` (no zone) holding the UTC wall clock;
/// a `timestamptz` bind would shift with the session `TimeZone` when cast.
fn wall_clock_utc(value: &DateTime<Utc>) -> NaiveDateTime {
    value.naive_utc()
}

#[async_trait]
impl TileStore for PgTileStore {
    async fn fetch_count(&self, stmt: &Statement) -> StoreResult<i64> {
        let row = self.fetch_one(stmt).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn fetch_keys(&self, stmt: &Statement) -> StoreResult<Vec<i64>> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing");
        let rows = bind(sqlx::query(&stmt.sql), &stmt.params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>(0).map_err(StoreError::from))
            .collect()
    }

    async fn table_columns(&self, table: &TableRef) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
        )
        .bind(table.schema.as_str())
        .bind(table.name.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(StoreError::from))
            .collect()
    }

    async fn fetch_tile(&self, stmt: &Statement) -> StoreResult<Option<Vec<u8>>> {
        let row = self.fetch_one(stmt).await?;
        let tile: Option<Vec<u8>> = row.try_get(0)?;
        Ok(tile.filter(|bytes| !bytes.is_empty()))
    }
}
