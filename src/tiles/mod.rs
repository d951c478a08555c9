//! Tile addressing: matrix sets, tile coordinates and their envelopes

mod matrix;

pub use matrix::{Bounds, Tile, TileCoord, TileGridError, TileMatrixSet, MAX_ZOOM};
