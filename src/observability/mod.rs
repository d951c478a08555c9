//! Observability for the tile service
//!
//! - Structured logging through `tracing`, text or JSON
//! - Lifecycle events from a closed [`Event`] set
//!
//! # Usage
//!
//! ```ignore
//! use geotile::observability::{init_logging, log_event, Event};
//!
//! init_logging(&config.logging);
//! log_event(Event::BootStart);
//!
//! // events with fields go through tracing directly
//! tracing::info!(event = %Event::CatalogLoaded, layers = 42, "catalog ready");
//! ```

mod events;

pub use events::Event;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the configured filter. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    if event.is_fatal() {
        tracing::error!(event = event.as_str());
    } else {
        tracing::info!(event = event.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // This just verifies no panic
        log_event(Event::BootStart);
        log_event(Event::BootFailed);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(&LoggingConfig::default());
        init_logging(&LoggingConfig {
            format: LogFormat::Json,
            filter: "debug".into(),
        });
    }
}
