//! Tile service
//!
//! Serving flow (strict order):
//! 1. Look up the layer in the catalog snapshot
//! 2. Plan the tile
//! 3. Skip the database for an empty plan
//! 4. Run the wrapped statement, bounded by the configured timeout
//!
//! Nothing is retried. A storage failure surfaces to the caller unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::catalog::LayerCatalog;
use crate::observability::Event;
use crate::planner::{TileError, TilePlan, TilePlanner, TileRequest, TileResult};
use crate::store::TileStore;

/// Serves encoded tiles for catalog layers
pub struct TileService {
    catalog: Arc<LayerCatalog>,
    store: Arc<dyn TileStore>,
    planner: TilePlanner,
    timeout: Option<Duration>,
}

impl TileService {
    pub fn new(catalog: Arc<LayerCatalog>, store: Arc<dyn TileStore>, planner: TilePlanner) -> Self {
        let timeout = planner.settings().tiles.query_timeout();
        Self {
            catalog,
            store,
            planner,
            timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<LayerCatalog> {
        &self.catalog
    }

    /// Builds the plan for a request without running the tile query
    pub async fn plan(&self, request: &TileRequest) -> TileResult<TilePlan> {
        let layer = self
            .catalog
            .get(&request.layer_id)
            .ok_or_else(|| TileError::LayerNotFound(request.layer_id.collection_id()))?;

        self.planner.plan(self.store.as_ref(), &layer, request).await
    }

    /// Returns the encoded tile, or `None` when it holds no features
    pub async fn fetch_tile(&self, request: &TileRequest) -> TileResult<Option<Vec<u8>>> {
        let started = Instant::now();
        let result = self.fetch(request).await;

        match &result {
            Ok(bytes) => info!(
                event = %Event::TileServed,
                layer_id = %request.layer_id,
                tile = %request.tile,
                bytes = bytes.as_ref().map_or(0, Vec::len),
                elapsed_ms = started.elapsed().as_millis() as u64
            ),
            Err(err) if err.is_user_error() => info!(
                event = %Event::TileRejected,
                layer_id = %request.layer_id,
                tile = %request.tile,
                code = err.code(),
                error = %err
            ),
            Err(err) => warn!(
                event = %Event::TileFailed,
                layer_id = %request.layer_id,
                tile = %request.tile,
                code = err.code(),
                error = %err
            ),
        }

        result
    }

    async fn fetch(&self, request: &TileRequest) -> TileResult<Option<Vec<u8>>> {
        let plan = self.plan(request).await?;

        let Some(stmt) = plan.to_statement() else {
            debug!(layer_id = %request.layer_id, tile = %request.tile, "empty plan, no tile query");
            return Ok(None);
        };

        let query = self.store.fetch_tile(&stmt);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .map_err(|_| TileError::Timeout(limit))?
                .map_err(TileError::from),
            None => query.await.map_err(TileError::from),
        }
    }
}
