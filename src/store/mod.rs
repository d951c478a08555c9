//! Storage engine access
//!
//! The planner never talks to the database directly. It hands rendered
//! [`Statement`]s to a [`TileStore`], which executes them and returns plain
//! values. Tile encoding (`ST_AsMVT`) happens inside the database.

mod errors;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::sql::{Statement, TableRef};

pub use errors::{StoreError, StoreResult};
pub use memory::ScriptedTileStore;
pub use postgres::{connect_pool, PgTileStore};

#[async_trait]
pub trait TileStore: Send + Sync {
    /// Runs a statement returning a single bigint (density probes)
    async fn fetch_count(&self, stmt: &Statement) -> StoreResult<i64>;

    /// Runs a statement returning one bigint per row (shard discovery)
    async fn fetch_keys(&self, stmt: &Statement) -> StoreResult<Vec<i64>>;

    /// Column names of a table, empty when the table does not exist
    async fn table_columns(&self, table: &TableRef) -> StoreResult<Vec<String>>;

    /// Runs a tile statement. NULL or zero bytes come back as `None`.
    async fn fetch_tile(&self, stmt: &Statement) -> StoreResult<Option<Vec<u8>>>;
}
