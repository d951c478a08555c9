//! geotile - vector tiles for catalog-defined PostGIS layers
//!
//! # Subsystems
//!
//! - [`catalog`]: live layer registry, refreshed by LISTEN/NOTIFY
//! - [`filter`]: request filters and CQL2-JSON compiled to SQL predicates
//! - [`planner`]: raw, clustered and sharded tile plans
//! - [`executor`]: runs plans against the [`store`]
//! - [`http_server`]: tile and health routes
//! - [`sql`]: SQL builder with positional parameters
//! - [`tiles`]: tile matrix sets and tile envelopes

pub mod catalog;
pub mod cli;
pub mod config;
pub mod executor;
pub mod filter;
pub mod http_server;
pub mod observability;
pub mod planner;
pub mod sql;
pub mod store;
pub mod tiles;
