//! Service configuration
//!
//! Loaded from a JSON file. Every field except the database URL has a
//! default, and the URL may come from the command line or `DATABASE_URL`
//! instead. The whole configuration is validated once on load.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::HttpServerConfig;
use crate::sql::TableRef;

/// Highest H3 resolution a bucket column can be coarsened to
const MAX_H3_RESOLUTION: u8 = 15;

/// Configuration errors (always fatal at startup)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tiles: TileSettings,
    #[serde(default)]
    pub clustering: ClusteringSettings,
    #[serde(default)]
    pub storage: StorageLayout,
    #[serde(default)]
    pub http: HttpServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection and registry location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    #[serde(default)]
    pub url: String,

    /// Pool size (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a query waits for a pooled connection (default: 5s)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Layer registry table (default: "customer.layer")
    #[serde(default = "default_registry_table")]
    pub registry_table: String,

    /// Channel carrying layer change notifications (default: "layer_changes")
    #[serde(default = "default_notification_channel")]
    pub notification_channel: String,
}

fn default_max_connections() -> u32 {
    10
}
fn default_acquire_timeout_ms() -> u64 {
    5_000
}
fn default_registry_table() -> String {
    "customer.layer".to_string()
}
fn default_notification_channel() -> String {
    "layer_changes".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            registry_table: default_registry_table(),
            notification_channel: default_notification_channel(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn registry_table(&self) -> TableRef {
        TableRef::parse(&self.registry_table)
    }
}

/// Per-tile limits and encoding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileSettings {
    /// Row limit when the request names none (default: 10000)
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Hard cap on the requested row limit (default: 20000)
    #[serde(default = "default_max_features_per_tile")]
    pub max_features_per_tile: u32,

    /// Timeout of the final tile query; none waits indefinitely
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,

    /// MVT extent (default: 4096)
    #[serde(default = "default_extent")]
    pub extent: u32,

    /// MVT buffer in tile pixels (default: 256)
    #[serde(default = "default_buffer")]
    pub buffer: u32,

    /// Layer name inside the encoded tile (default: "default")
    #[serde(default = "default_layer_name")]
    pub layer_name: String,
}

fn default_limit() -> u32 {
    10_000
}
fn default_max_features_per_tile() -> u32 {
    20_000
}
fn default_extent() -> u32 {
    4096
}
fn default_buffer() -> u32 {
    256
}
fn default_layer_name() -> String {
    "default".to_string()
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_features_per_tile: default_max_features_per_tile(),
            query_timeout_ms: None,
            extent: default_extent(),
            buffer: default_buffer(),
            layer_name: default_layer_name(),
        }
    }
}

impl TileSettings {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Point clustering at low zoom levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSettings {
    /// Clustering is considered only for zooms strictly below this (default: 8)
    #[serde(default = "default_cluster_max_zoom")]
    pub max_zoom: u8,

    /// The density probe never counts past this many rows (default: 20000)
    #[serde(default = "default_sample_ceiling")]
    pub sample_ceiling: u32,

    /// Zoom level → H3 resolution used to group points
    #[serde(default = "default_resolutions")]
    pub resolutions: BTreeMap<u8, u8>,
}

fn default_cluster_max_zoom() -> u8 {
    8
}
fn default_sample_ceiling() -> u32 {
    20_000
}
fn default_resolutions() -> BTreeMap<u8, u8> {
    BTreeMap::from([
        (0, 2),
        (1, 2),
        (2, 3),
        (3, 3),
        (4, 4),
        (5, 5),
        (6, 6),
        (7, 7),
    ])
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            max_zoom: default_cluster_max_zoom(),
            sample_ceiling: default_sample_ceiling(),
            resolutions: default_resolutions(),
        }
    }
}

impl ClusteringSettings {
    /// H3 resolution for a zoom level, if clustering is configured there
    pub fn resolution_for(&self, zoom: u8) -> Option<u8> {
        self.resolutions.get(&zoom).copied()
    }
}

/// Physical layout of the layer data tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLayout {
    #[serde(default = "default_data_schema")]
    pub data_schema: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_geometry_column")]
    pub geometry_column: String,
    #[serde(default = "default_srid")]
    pub srid: i32,
    /// Column holding the owning layer id; every query is scoped by it
    #[serde(default = "default_scope_column")]
    pub scope_column: String,
    #[serde(default = "default_shard_key_column")]
    pub shard_key_column: String,
    #[serde(default = "default_cluster_flag_column")]
    pub cluster_flag_column: String,
    #[serde(default = "default_cluster_bucket_column")]
    pub cluster_bucket_column: String,
    /// Coarse partition grid used to discover shard keys
    #[serde(default = "default_shard_index_table")]
    pub shard_index_table: String,
    #[serde(default = "default_shard_index_key_column")]
    pub shard_index_key_column: String,
    #[serde(default = "default_geometry_column")]
    pub shard_index_geometry_column: String,
}

fn default_data_schema() -> String {
    "user_data".to_string()
}
fn default_id_column() -> String {
    "id".to_string()
}
fn default_geometry_column() -> String {
    "geom".to_string()
}
fn default_srid() -> i32 {
    4326
}
fn default_scope_column() -> String {
    "layer_id".to_string()
}
fn default_shard_key_column() -> String {
    "h3_3".to_string()
}
fn default_cluster_flag_column() -> String {
    "cluster_keep".to_string()
}
fn default_cluster_bucket_column() -> String {
    "h3_group".to_string()
}
fn default_shard_index_table() -> String {
    "basic.h3_3_grid".to_string()
}
fn default_shard_index_key_column() -> String {
    "h3_short".to_string()
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            data_schema: default_data_schema(),
            id_column: default_id_column(),
            geometry_column: default_geometry_column(),
            srid: default_srid(),
            scope_column: default_scope_column(),
            shard_key_column: default_shard_key_column(),
            cluster_flag_column: default_cluster_flag_column(),
            cluster_bucket_column: default_cluster_bucket_column(),
            shard_index_table: default_shard_index_table(),
            shard_index_key_column: default_shard_index_key_column(),
            shard_index_geometry_column: default_geometry_column(),
        }
    }
}

impl StorageLayout {
    pub fn shard_index(&self) -> TableRef {
        TableRef::parse(&self.shard_index_table)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `tracing` filter directive; `RUST_LOG` takes precedence (default: "info")
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

impl ServiceConfig {
    /// Loads and validates a configuration file.
    ///
    /// `database_url` replaces the file's URL when given.
    pub fn load(path: &Path, database_url: Option<String>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: ServiceConfig = serde_json::from_str(&content)?;
        if let Some(url) = database_url {
            config.database.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database.url must be set (or pass --database-url / DATABASE_URL)".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be > 0".into()));
        }

        if self.tiles.max_features_per_tile == 0 {
            return Err(ConfigError::Invalid(
                "tiles.max_features_per_tile must be > 0".into(),
            ));
        }

        if self.tiles.default_limit == 0
            || self.tiles.default_limit > self.tiles.max_features_per_tile
        {
            return Err(ConfigError::Invalid(format!(
                "tiles.default_limit must be between 1 and {}",
                self.tiles.max_features_per_tile
            )));
        }

        // A probe capped below the row limit could never report a dense tile.
        if self.clustering.sample_ceiling < self.tiles.max_features_per_tile {
            return Err(ConfigError::Invalid(format!(
                "clustering.sample_ceiling ({}) must be >= tiles.max_features_per_tile ({})",
                self.clustering.sample_ceiling, self.tiles.max_features_per_tile
            )));
        }

        if let Some((zoom, res)) = self
            .clustering
            .resolutions
            .iter()
            .find(|(_, res)| **res > MAX_H3_RESOLUTION)
        {
            return Err(ConfigError::Invalid(format!(
                "clustering.resolutions[{}] = {} exceeds H3 resolution {}",
                zoom, res, MAX_H3_RESOLUTION
            )));
        }

        Ok(())
    }
}
