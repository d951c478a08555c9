//! Observable service events
//!
//! Every lifecycle log line carries one of these as its `event` field, so
//! logs can be filtered on a closed set of names.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Startup begins
    BootStart,
    /// Startup complete, ready to serve
    BootComplete,
    /// Startup failed (FATAL)
    BootFailed,
    /// Shutdown initiated
    ShutdownStart,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Catalog
    /// Initial registry scan complete
    CatalogLoaded,
    /// Notification listener attached
    CatalogSubscribed,
    /// Catalog event applied
    CatalogEventApplied,
    /// Catalog event dropped (malformed or unknown operation)
    CatalogEventDropped,
    /// Catalog event failed to apply
    CatalogEventFailed,
    /// Catalog reloaded after missed events
    CatalogResynced,
    /// Notification stream ended
    CatalogStreamClosed,

    // Tiles
    /// Tile plan built
    TilePlanned,
    /// Tile served
    TileServed,
    /// Tile request rejected (user input)
    TileRejected,
    /// Tile request failed (storage)
    TileFailed,

    // Server
    /// HTTP listener bound
    Serving,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::BootComplete => "BOOT_COMPLETE",
            Event::BootFailed => "BOOT_FAILED",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CatalogLoaded => "CATALOG_LOADED",
            Event::CatalogSubscribed => "CATALOG_SUBSCRIBED",
            Event::CatalogEventApplied => "CATALOG_EVENT_APPLIED",
            Event::CatalogEventDropped => "CATALOG_EVENT_DROPPED",
            Event::CatalogEventFailed => "CATALOG_EVENT_FAILED",
            Event::CatalogResynced => "CATALOG_RESYNCED",
            Event::CatalogStreamClosed => "CATALOG_STREAM_CLOSED",
            Event::TilePlanned => "TILE_PLANNED",
            Event::TileServed => "TILE_SERVED",
            Event::TileRejected => "TILE_REJECTED",
            Event::TileFailed => "TILE_FAILED",
            Event::Serving => "SERVING",
        }
    }

    /// Returns true if this event is fatal
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::BootFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::BootStart.as_str(), "BOOT_START");
        assert_eq!(Event::CatalogEventDropped.as_str(), "CATALOG_EVENT_DROPPED");
        assert_eq!(Event::CatalogResynced.as_str(), "CATALOG_RESYNCED");
        assert_eq!(Event::TileServed.to_string(), "TILE_SERVED");
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::BootFailed.is_fatal());
        assert!(!Event::CatalogEventFailed.is_fatal());
        assert!(!Event::TileFailed.is_fatal());
    }
}
