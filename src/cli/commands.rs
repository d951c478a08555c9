//! CLI command implementations
//!
//! # Serve boot sequence (strict order)
//!
//! 1. Load and validate configuration, install logging
//! 2. Open the connection pool
//! 3. Subscribe to the layer change channel
//! 4. Bootstrap the catalog from one registry scan (failure is fatal)
//! 5. Start applying change notifications in the background
//! 6. Bind the HTTP listener
//!
//! Subscribing before the scan means a change committed during the scan is
//! delivered afterwards and re-applied; nothing is missed.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::catalog::{apply_stream, LayerCatalog, NotificationListener, PgRegistrySource};
use crate::config::ServiceConfig;
use crate::executor::TileService;
use crate::http_server::HttpServer;
use crate::observability::{init_logging, log_event, Event};
use crate::planner::{PlannerSettings, TilePlanner};
use crate::store::{connect_pool, PgTileStore, TileStore};

use super::args::{Cli, Command};
use super::errors::CliResult;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve {
            config,
            database_url,
        } => serve(&config, database_url),
        Command::CheckConfig {
            config,
            database_url,
        } => check_config(&config, database_url, &mut std::io::stdout()),
    }
}

/// Prints the effective configuration as JSON
pub fn check_config(
    config_path: &Path,
    database_url: Option<String>,
    out: &mut impl Write,
) -> CliResult<()> {
    let config = ServiceConfig::load(config_path, database_url)?;
    serde_json::to_writer_pretty(&mut *out, &config)?;
    writeln!(out)?;
    Ok(())
}

pub fn serve(config_path: &Path, database_url: Option<String>) -> CliResult<()> {
    let config = ServiceConfig::load(config_path, database_url)?;
    init_logging(&config.logging);
    log_event(Event::BootStart);
    info!(event = %Event::ConfigLoaded, path = %config_path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = match boot(&config).await {
            Ok(server) => server,
            Err(err) => {
                error!(event = %Event::BootFailed, code = err.code(), error = %err);
                return Err(err);
            }
        };

        log_event(Event::BootComplete);
        server.start(shutdown_signal()).await?;
        Ok(())
    })
}

async fn boot(config: &ServiceConfig) -> CliResult<HttpServer> {
    let pool = connect_pool(&config.database).await?;

    let listener = NotificationListener::connect(&pool, &config.database.notification_channel).await?;

    let source = Arc::new(PgRegistrySource::new(pool.clone(), config.database.registry_table()));
    let catalog = Arc::new(LayerCatalog::bootstrap(source).await?);

    let sync_target = Arc::clone(&catalog);
    tokio::spawn(async move {
        let stats = apply_stream(sync_target.as_ref(), listener.into_messages()).await;
        info!(
            applied = stats.applied,
            dropped = stats.dropped,
            failed = stats.failed,
            resyncs = stats.resyncs,
            "catalog sync stopped"
        );
    });

    let store: Arc<dyn TileStore> = Arc::new(PgTileStore::new(pool));
    let planner = TilePlanner::new(PlannerSettings::from_config(config));
    let service = Arc::new(TileService::new(catalog, store, planner));

    Ok(HttpServer::new(config.http.clone(), service))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown handler");
        return;
    }
    log_event(Event::ShutdownStart);
}
