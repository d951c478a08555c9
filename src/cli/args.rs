//! CLI argument definitions using clap
//!
//! Commands:
//! - geotile serve --config <path> [--database-url <url>]
//! - geotile check-config --config <path> [--database-url <url>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// geotile - vector tiles for catalog-defined PostGIS layers
#[derive(Parser, Debug)]
#[command(name = "geotile")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the layer catalog and serve tiles
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./geotile.json")]
        config: PathBuf,

        /// Overrides `database.url` from the configuration file
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Validate the configuration, print the effective settings and exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./geotile.json")]
        config: PathBuf,

        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "geotile",
            "serve",
            "--config",
            "/etc/geotile.json",
            "--database-url",
            "postgres://localhost/gis",
        ])
        .unwrap();

        match cli.command {
            Command::Serve {
                config,
                database_url,
            } => {
                assert_eq!(config, PathBuf::from("/etc/geotile.json"));
                assert_eq!(database_url.as_deref(), Some("postgres://localhost/gis"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config_default_path() {
        let cli = Cli::try_parse_from(["geotile", "check-config"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::CheckConfig { ref config, .. } if config == &PathBuf::from("./geotile.json")
        ));
    }
}
