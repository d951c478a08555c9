//! Registry sources the catalog reads layer rows from

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::definition::{LayerId, LayerRecord};
use super::errors::{CatalogError, CatalogResult};
use crate::sql::{quote_ident, TableRef};

/// Read access to the layer registry
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Returns every layer row
    async fn scan_all(&self) -> CatalogResult<Vec<LayerRecord>>;

    /// Returns one layer row, or `None` if it no longer exists
    async fn fetch(&self, id: LayerId) -> CatalogResult<Option<LayerRecord>>;
}

/// Registry table in PostgreSQL
pub struct PgRegistrySource {
    pool: PgPool,
    table: TableRef,
}

impl PgRegistrySource {
    pub fn new(pool: PgPool, table: TableRef) -> Self {
        Self { pool, table }
    }

    fn sql(&self, single: bool) -> String {
        format!(
            "SELECT l.id, l.user_id, l.name, l.attribute_mapping, \
                    l.feature_layer_geometry_type::text AS geometry_type, \
                    COALESCE(l.sharded, FALSE) AS sharded, \
                    ST_XMin(b.e) AS xmin, ST_YMin(b.e) AS ymin, \
                    ST_XMax(b.e) AS xmax, ST_YMax(b.e) AS ymax \
             FROM {}.{} l \
             LEFT JOIN LATERAL (SELECT ST_Envelope(l.extent) AS e) b ON TRUE \
             WHERE l.type IN ('feature', 'table'){}",
            quote_ident(&self.table.schema),
            quote_ident(&self.table.name),
            if single { " AND l.id = $1" } else { "" }
        )
    }

    fn decode(row: &PgRow) -> CatalogResult<LayerRecord> {
        let id: Uuid = row.try_get("id")?;
        let bounds: [Option<f64>; 4] = [
            row.try_get("xmin")?,
            row.try_get("ymin")?,
            row.try_get("xmax")?,
            row.try_get("ymax")?,
        ];
        let extent = match bounds {
            [Some(xmin), Some(ymin), Some(xmax), Some(ymax)] => Some([xmin, ymin, xmax, ymax]),
            _ => None,
        };

        Ok(LayerRecord {
            id,
            owner: row.try_get("user_id")?,
            name: row.try_get("name")?,
            attribute_mapping: row
                .try_get::<Option<serde_json::Value>, _>("attribute_mapping")?
                .unwrap_or(serde_json::Value::Null),
            geometry_type: row.try_get("geometry_type")?,
            extent,
            sharded: row.try_get("sharded")?,
        })
    }
}

#[async_trait]
impl RegistrySource for PgRegistrySource {
    async fn scan_all(&self) -> CatalogResult<Vec<LayerRecord>> {
        let rows = sqlx::query(&self.sql(false)).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn fetch(&self, id: LayerId) -> CatalogResult<Option<LayerRecord>> {
        let row = sqlx::query(&self.sql(true))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }
}

/// In-memory registry (tests and tooling)
#[derive(Debug, Default)]
pub struct MemoryRegistrySource {
    records: RwLock<BTreeMap<LayerId, LayerRecord>>,
    unavailable: AtomicBool,
}

impl MemoryRegistrySource {
    pub fn new(records: impl IntoIterator<Item = LayerRecord>) -> Self {
        let source = Self::default();
        for record in records {
            source.put(record);
        }
        source
    }

    /// Inserts or replaces a row
    pub fn put(&self, record: LayerRecord) {
        if let Ok(mut records) = self.records.write() {
            records.insert(LayerId::new(record.id), record);
        }
    }

    pub fn delete(&self, id: LayerId) {
        if let Ok(mut records) = self.records.write() {
            records.remove(&id);
        }
    }

    /// Makes every subsequent read fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> CatalogResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("registry marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrySource for MemoryRegistrySource {
    async fn scan_all(&self) -> CatalogResult<Vec<LayerRecord>> {
        self.check_available()?;
        let records = self
            .records
            .read()
            .map_err(|_| CatalogError::Unavailable("registry lock poisoned".into()))?;
        Ok(records.values().cloned().collect())
    }

    async fn fetch(&self, id: LayerId) -> CatalogResult<Option<LayerRecord>> {
        self.check_available()?;
        let records = self
            .records
            .read()
            .map_err(|_| CatalogError::Unavailable("registry lock poisoned".into()))?;
        Ok(records.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: u128) -> LayerRecord {
        LayerRecord {
            id: Uuid::from_u128(n),
            owner: Uuid::from_u128(99),
            name: format!("layer {}", n),
            attribute_mapping: json!({}),
            geometry_type: Some("point".into()),
            extent: None,
            sharded: false,
        }
    }

    #[tokio::test]
    async fn test_memory_source_fetch_and_delete() {
        let source = MemoryRegistrySource::new([record(1), record(2)]);
        let id = LayerId::new(Uuid::from_u128(1));

        assert_eq!(source.scan_all().await.unwrap().len(), 2);
        assert!(source.fetch(id).await.unwrap().is_some());

        source.delete(id);
        assert!(source.fetch(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_source_unavailable() {
        let source = MemoryRegistrySource::new([record(1)]);
        source.set_unavailable(true);
        assert!(matches!(
            source.scan_all().await,
            Err(CatalogError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_sql_filters_layer_types() {
        let pool = PgPool::connect_lazy("postgres://localhost/registry").unwrap();
        let source = PgRegistrySource::new(pool, TableRef::new("customer", "layer"));

        let all = source.sql(false);
        assert!(all.contains("FROM \"customer\".\"layer\" l"));
        assert!(all.contains("l.type IN ('feature', 'table')"));
        assert!(!all.contains("$1"));
        assert!(source.sql(true).ends_with("AND l.id = $1"));
    }
}
