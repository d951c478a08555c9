//! CLI module for geotile
//!
//! Provides command-line interface for:
//! - serve: Boot the catalog and serve tiles
//! - check-config: Validate a configuration file

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check_config, run, run_command, serve};
pub use errors::{CliError, CliResult};
