//! Tile query planning
//!
//! Turns a tile request into a [`TilePlan`]: one or more sub-selects over
//! the layer's table, merged and wrapped into a single `ST_AsMVT` statement.
//!
//! # Strategies
//!
//! - Raw: one select with the requested attributes, ordered so the largest
//!   features survive the row limit
//! - Clustered: dense point tiles below the clustering zoom collapse to one
//!   point per H3 bucket ([`DensityProber`] decides, [`ClusterAggregator`]
//!   builds)
//! - Sharded: one raw select per shard key under the tile, merged with
//!   `UNION ALL`
//!
//! Planning may query the store (density probe, shard discovery) but never
//! runs the tile statement itself.

mod cluster;
mod density;
mod errors;
mod explain;
mod plan;
mod planner;

pub use cluster::ClusterAggregator;
pub use density::{Density, DensityProber};
pub use errors::{TileError, TileResult};
pub use explain::ExplainPlan;
pub use plan::{MergeMode, Strategy, TilePlan, TileWrap, GEOMETRY_ALIAS};
pub use planner::{PlannerSettings, TilePlanner, TileRequest};
