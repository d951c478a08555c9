//! Tile request errors
//!
//! User-input errors reject the request before any tile query runs.
//! Storage errors are passed through unchanged; nothing is retried here.

use std::time::Duration;

use thiserror::Error;

use crate::filter::FilterError;
use crate::store::StoreError;
use crate::tiles::TileGridError;

/// Result type for planning and serving tiles
pub type TileResult<T> = Result<T, TileError>;

#[derive(Debug, Error)]
pub enum TileError {
    // ==================
    // User input
    // ==================
    #[error("{0}")]
    Filter(#[from] FilterError),

    #[error("Invalid geometry column name: {0}")]
    InvalidGeometryColumnName(String),

    #[error("Invalid limit {requested}: must be between 1 and {maximum}")]
    InvalidLimit { requested: i64, maximum: i64 },

    #[error("Invalid tile: {0}")]
    InvalidTile(#[from] TileGridError),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    // ==================
    // Storage
    // ==================
    #[error("{0}")]
    Storage(#[from] StoreError),

    #[error("Tile query timed out after {0:?}")]
    Timeout(Duration),
}

impl TileError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TileError::Filter(e) => e.code(),
            TileError::InvalidGeometryColumnName(_) => "InvalidGeometryColumnName",
            TileError::InvalidLimit { .. } => "InvalidLimit",
            TileError::InvalidTile(_) => "InvalidTile",
            TileError::LayerNotFound(_) => "LayerNotFound",
            TileError::Storage(_) => "StorageError",
            TileError::Timeout(_) => "Timeout",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TileError::Filter(_)
            | TileError::InvalidGeometryColumnName(_)
            | TileError::InvalidLimit { .. }
            | TileError::InvalidTile(_) => 400,
            TileError::LayerNotFound(_) => 404,
            TileError::Storage(e) if e.is_pool_timeout() => 503,
            TileError::Storage(_) => 500,
            TileError::Timeout(_) => 503,
        }
    }

    /// Caller may retry the same request: the tile fetch timed out or the
    /// pool had no free connection
    pub fn is_retryable(&self) -> bool {
        match self {
            TileError::Timeout(_) => true,
            TileError::Storage(e) => e.is_pool_timeout(),
            _ => false,
        }
    }

    /// Rejected because of the request itself
    pub fn is_user_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
