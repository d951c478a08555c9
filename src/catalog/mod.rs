//! Layer Catalog
//!
//! In-memory registry of layer definitions, kept in step with the layer
//! registry table.
//!
//! # Lifecycle
//!
//! 1. [`NotificationListener::connect`] attaches to the change channel
//! 2. [`LayerCatalog::bootstrap`] loads every layer (failure is fatal)
//! 3. [`apply_stream`] applies INSERT / UPDATE / DELETE events in order and
//!    reloads everything with [`LayerCatalog::reload`] when events may have
//!    been missed
//!
//! Readers call [`LayerCatalog::get`] and never wait on a writer.

mod catalog;
mod definition;
mod errors;
mod event;
mod source;
mod sync;

pub use catalog::{ApplyEvent, CatalogChange, LayerCatalog, LayerMap};
pub use definition::{
    Attribute, AttributeType, GeometryType, LayerDefinition, LayerId, LayerRecord,
    COLLECTION_PREFIX, WORLD_EXTENT,
};
pub use errors::{CatalogError, CatalogResult};
pub use event::{CatalogEvent, EventKind};
pub use source::{MemoryRegistrySource, PgRegistrySource, RegistrySource};
pub use sync::{apply_stream, NotificationListener, SyncMessage, SyncStats};
