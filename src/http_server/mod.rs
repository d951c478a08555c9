//! # HTTP Server Module
//!
//! Serves vector tiles over axum.
//!
//! # Endpoints
//!
//! - `/healthz` - Liveness check
//! - `/collections/{collection_id}/tiles/{matrix_set}/{z}/{x}/{y}` - Encoded tile

pub mod config;
pub mod errors;
pub mod server;
pub mod tile_routes;

pub use config::HttpServerConfig;
pub use errors::ErrorResponse;
pub use server::HttpServer;
pub use tile_routes::MVT_CONTENT_TYPE;
