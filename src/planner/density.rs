//! Density probe
//!
//! Decides between raw and clustered retrieval for point layers at low
//! zoom. The probe counts rows of the layer under the tile, but stops at a
//! configured ceiling so a dense tile costs no more than a sparse one.

use tracing::debug;

use super::errors::TileResult;
use super::PlannerSettings;
use crate::catalog::LayerDefinition;
use crate::filter::PredicateCompiler;
use crate::sql::{Expr, Projection, Query, Select, Statement, TableRef};
use crate::store::TileStore;
use crate::tiles::Tile;

/// Outcome of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Density {
    /// Not a point layer, or the zoom is at or above the clustering threshold
    NotApplicable,
    /// No bucket resolution for this zoom, or the table lacks the cluster
    /// columns
    ClusteringUnavailable,
    /// Fewer rows than the limit
    Sparse { sampled: i64 },
    /// At least as many rows as the limit
    Dense { sampled: i64, resolution: u8 },
}

impl Density {
    /// Resolution to cluster at, when clustering was chosen
    pub fn cluster_resolution(&self) -> Option<u8> {
        match self {
            Density::Dense { resolution, .. } => Some(*resolution),
            _ => None,
        }
    }
}

pub struct DensityProber<'a> {
    store: &'a dyn TileStore,
    settings: &'a PlannerSettings,
}

impl<'a> DensityProber<'a> {
    pub fn new(store: &'a dyn TileStore, settings: &'a PlannerSettings) -> Self {
        Self { store, settings }
    }

    pub async fn probe(
        &self,
        layer: &LayerDefinition,
        tile: &Tile,
        geometry: &str,
        limit: i64,
    ) -> TileResult<Density> {
        let clustering = &self.settings.clustering;
        if !layer.is_point() || tile.zoom() >= clustering.max_zoom {
            return Ok(Density::NotApplicable);
        }

        let Some(resolution) = clustering.resolution_for(tile.zoom()) else {
            return Ok(Density::ClusteringUnavailable);
        };

        let table = layer.table(&self.settings.layout);
        if !self.has_cluster_columns(&table).await? {
            debug!(layer_id = %layer.id, table = %table, "cluster columns missing, clustering disabled");
            return Ok(Density::ClusteringUnavailable);
        }

        let stmt = self.statement(layer, &table, tile, geometry);
        let sampled = self.store.fetch_count(&stmt).await?;

        Ok(if sampled >= limit {
            Density::Dense {
                sampled,
                resolution,
            }
        } else {
            Density::Sparse { sampled }
        })
    }

    async fn has_cluster_columns(&self, table: &TableRef) -> TileResult<bool> {
        let layout = &self.settings.layout;
        let columns = self.store.table_columns(table).await?;
        let has = |name: &str| columns.iter().any(|c| c == name);
        Ok(has(&layout.cluster_flag_column) && has(&layout.cluster_bucket_column))
    }

    /// `SELECT count(1) FROM (SELECT 1 FROM <table> WHERE <scope and tile>
    /// LIMIT <ceiling>) AS "sample"`
    pub fn statement(
        &self,
        layer: &LayerDefinition,
        table: &TableRef,
        tile: &Tile,
        geometry: &str,
    ) -> Statement {
        let compiler = PredicateCompiler::new(layer, &self.settings.layout);
        let predicate = Expr::and(vec![
            Expr::Bool(true),
            compiler.scope(),
            compiler.tile_clause(tile, geometry),
        ]);

        let sample = Select::from_table(table.clone())
            .project(Projection::new(Expr::Int(1)))
            .filter(predicate)
            .limit(i64::from(self.settings.clustering.sample_ceiling));

        Statement::wrap(
            &[Projection::new(Expr::func("count", vec![Expr::Int(1)]))],
            &Query::Select(sample),
            "sample",
        )
    }
}
