//! CLI error types
//!
//! Every CLI error is fatal: `main` prints it and exits non-zero.

use std::io;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog bootstrap failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database connection failed: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "GEOTILE_CLI_CONFIG_ERROR",
            CliError::Catalog(_) => "GEOTILE_CLI_BOOT_FAILED",
            CliError::Store(_) => "GEOTILE_CLI_DATABASE_ERROR",
            CliError::Io(_) => "GEOTILE_CLI_IO_ERROR",
            CliError::Json(_) => "GEOTILE_CLI_IO_ERROR",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
