//! Scripted tile store
//!
//! Answers every call from a fixed script and records each statement it
//! receives, so plans can be checked without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::{StoreError, StoreResult};
use super::TileStore;
use crate::sql::{Statement, TableRef};

#[derive(Debug, Default)]
pub struct ScriptedTileStore {
    count: i64,
    keys: Vec<i64>,
    /// Columns per `schema.table`
    columns: HashMap<String, Vec<String>>,
    tile: Option<Vec<u8>>,
    tile_delay: Option<Duration>,
    failing: AtomicBool,
    statements: Mutex<Vec<Statement>>,
}

impl ScriptedTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer of every density probe
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    /// Shard keys returned by discovery
    pub fn with_keys(mut self, keys: impl IntoIterator<Item = i64>) -> Self {
        self.keys = keys.into_iter().collect();
        self
    }

    pub fn with_columns(mut self, table: &TableRef, columns: &[&str]) -> Self {
        self.columns.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn with_tile(mut self, tile: impl Into<Vec<u8>>) -> Self {
        self.tile = Some(tile.into());
        self
    }

    /// Delays every tile fetch
    pub fn with_tile_delay(mut self, delay: Duration) -> Self {
        self.tile_delay = Some(delay);
        self
    }

    /// Makes every subsequent call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Statements received so far, in order
    pub fn statements(&self) -> Vec<Statement> {
        self.statements
            .lock()
            .map(|statements| statements.clone())
            .unwrap_or_default()
    }

    fn record(&self, stmt: &Statement) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted failure".into()));
        }
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(stmt.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl TileStore for ScriptedTileStore {
    async fn fetch_count(&self, stmt: &Statement) -> StoreResult<i64> {
        self.record(stmt)?;
        Ok(self.count)
    }

    async fn fetch_keys(&self, stmt: &Statement) -> StoreResult<Vec<i64>> {
        self.record(stmt)?;
        Ok(self.keys.clone())
    }

    async fn table_columns(&self, table: &TableRef) -> StoreResult<Vec<String>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted failure".into()));
        }
        Ok(self.columns.get(&table.to_string()).cloned().unwrap_or_default())
    }

    async fn fetch_tile(&self, stmt: &Statement) -> StoreResult<Option<Vec<u8>>> {
        self.record(stmt)?;
        if let Some(delay) = self.tile_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.tile.clone().filter(|bytes| !bytes.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlValue;

    fn stmt(sql: &str) -> Statement {
        Statement {
            sql: sql.to_string(),
            params: vec![SqlValue::Int(1)],
        }
    }

    #[tokio::test]
    async fn test_records_statements_in_order() {
        let store = ScriptedTileStore::new().with_count(12).with_keys([3, 4]);

        assert_eq!(store.fetch_count(&stmt("count")).await.unwrap(), 12);
        assert_eq!(store.fetch_keys(&stmt("keys")).await.unwrap(), vec![3, 4]);
        assert_eq!(store.fetch_tile(&stmt("tile")).await.unwrap(), None);

        let seen: Vec<_> = store.statements().into_iter().map(|s| s.sql).collect();
        assert_eq!(seen, vec!["count", "keys", "tile"]);
    }

    #[tokio::test]
    async fn test_columns_by_table() {
        let table = TableRef::new("user_data", "point_abc");
        let store = ScriptedTileStore::new().with_columns(&table, &["id", "geom"]);

        assert_eq!(store.table_columns(&table).await.unwrap(), vec!["id", "geom"]);
        assert!(store
            .table_columns(&TableRef::new("user_data", "other"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = ScriptedTileStore::new();
        store.set_failing(true);
        assert!(store.fetch_count(&stmt("count")).await.is_err());
        assert!(store.statements().is_empty());
    }
}
