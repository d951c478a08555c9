//! Tile execution
//!
//! [`TileService`] ties the catalog, the planner and the store together:
//! it resolves the layer, plans the tile and runs the single wrapped
//! statement that produces the encoded bytes.

mod executor;

pub use executor::TileService;
