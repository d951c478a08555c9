//! Live layer catalog
//!
//! The catalog map is never mutated in place. Every change builds a new map
//! and publishes it with one atomic pointer swap, so a reader holding a
//! snapshot keeps seeing a complete, consistent set of definitions while a
//! writer prepares the next one. Writers are serialized by a mutex; readers
//! never take it.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::definition::{LayerDefinition, LayerId};
use super::errors::CatalogResult;
use super::event::{CatalogEvent, EventKind};
use super::source::RegistrySource;
use crate::observability::Event;

/// Point-in-time view of the whole catalog
pub type LayerMap = HashMap<LayerId, Arc<LayerDefinition>>;

/// Outcome of applying one change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogChange {
    Inserted,
    Replaced,
    Removed,
    /// Nothing to do (upsert target gone, or delete of an absent id)
    Unchanged,
}

/// Consumer of serialized `{kind, key}` catalog events
#[async_trait]
pub trait ApplyEvent: Send + Sync {
    async fn apply(&self, event: CatalogEvent) -> CatalogResult<CatalogChange>;

    /// Rebuilds everything from the source of truth; returns the entry count
    async fn resync(&self) -> CatalogResult<usize>;
}

/// Registry of layer definitions
pub struct LayerCatalog {
    layers: ArcSwap<LayerMap>,
    source: Arc<dyn RegistrySource>,
    writer: Mutex<()>,
}

impl LayerCatalog {
    /// Builds the catalog from one full registry scan.
    ///
    /// Any scan or definition error fails the whole bootstrap; a partial
    /// catalog is never returned.
    pub async fn bootstrap(source: Arc<dyn RegistrySource>) -> CatalogResult<Self> {
        let records = source.scan_all().await?;

        let mut layers = LayerMap::with_capacity(records.len());
        for record in &records {
            let definition = LayerDefinition::from_record(record)?;
            layers.insert(definition.id, Arc::new(definition));
        }

        info!(event = %Event::CatalogLoaded, layers = layers.len(), "layer catalog loaded");

        Ok(Self {
            layers: ArcSwap::from_pointee(layers),
            source,
            writer: Mutex::new(()),
        })
    }

    /// Returns the current definition of a layer
    pub fn get(&self, id: &LayerId) -> Option<Arc<LayerDefinition>> {
        self.layers.load().get(id).cloned()
    }

    /// Returns a snapshot of every layer
    pub fn get_all(&self) -> Arc<LayerMap> {
        self.layers.load_full()
    }

    pub fn len(&self) -> usize {
        self.layers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refetches one layer and replaces its entry.
    ///
    /// A layer that no longer exists in the registry is left alone: the
    /// matching DELETE is on its way. If the row cannot be turned into a
    /// definition the previous entry stays and the error is returned.
    pub async fn upsert(&self, id: LayerId) -> CatalogResult<CatalogChange> {
        let _guard = self.writer.lock().await;

        let Some(record) = self.source.fetch(id).await? else {
            debug!(layer_id = %id, "upsert target no longer in registry");
            return Ok(CatalogChange::Unchanged);
        };
        let definition = Arc::new(LayerDefinition::from_record(&record)?);

        let mut next = LayerMap::clone(&self.layers.load());
        let previous = next.insert(id, definition);
        self.layers.store(Arc::new(next));

        Ok(if previous.is_some() {
            CatalogChange::Replaced
        } else {
            CatalogChange::Inserted
        })
    }

    /// Rescans the whole registry and publishes the result in one swap.
    ///
    /// A row that cannot be turned into a definition keeps its previous
    /// entry, as [`upsert`](Self::upsert) does. Scan errors leave the
    /// catalog untouched.
    pub async fn reload(&self) -> CatalogResult<usize> {
        let _guard = self.writer.lock().await;

        let records = self.source.scan_all().await?;
        let current = self.layers.load();

        let mut next = LayerMap::with_capacity(records.len());
        for record in &records {
            match LayerDefinition::from_record(record) {
                Ok(definition) => {
                    next.insert(definition.id, Arc::new(definition));
                }
                Err(e) => {
                    warn!(layer_id = %record.id, error = %e, "keeping previous definition");
                    let id = LayerId::new(record.id);
                    if let Some(previous) = current.get(&id) {
                        next.insert(id, Arc::clone(previous));
                    }
                }
            }
        }

        let layers = next.len();
        self.layers.store(Arc::new(next));
        Ok(layers)
    }

    /// Removes a layer; removing an absent id is a no-op
    pub async fn remove(&self, id: LayerId) -> CatalogChange {
        let _guard = self.writer.lock().await;

        let current = self.layers.load();
        if !current.contains_key(&id) {
            return CatalogChange::Unchanged;
        }

        let mut next = LayerMap::clone(&current);
        next.remove(&id);
        self.layers.store(Arc::new(next));
        CatalogChange::Removed
    }
}

#[async_trait]
impl ApplyEvent for LayerCatalog {
    async fn apply(&self, event: CatalogEvent) -> CatalogResult<CatalogChange> {
        let change = match event.kind {
            EventKind::Insert | EventKind::Update => self.upsert(event.layer_id).await,
            EventKind::Delete => Ok(self.remove(event.layer_id).await),
        };

        if let Err(e) = &change {
            warn!(layer_id = %event.layer_id, kind = %event.kind, error = %e, "catalog change not applied");
        }
        change
    }

    async fn resync(&self) -> CatalogResult<usize> {
        self.reload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::source::MemoryRegistrySource;
    use crate::catalog::LayerRecord;
    use serde_json::json;
    use uuid::Uuid;

    fn record(n: u128, name: &str) -> LayerRecord {
        LayerRecord {
            id: Uuid::from_u128(n),
            owner: Uuid::from_u128(500),
            name: name.to_string(),
            attribute_mapping: json!({"text_attr1": "label"}),
            geometry_type: Some("line".into()),
            extent: Some([0.0, 0.0, 1.0, 1.0]),
            sharded: false,
        }
    }

    fn id(n: u128) -> LayerId {
        LayerId::new(Uuid::from_u128(n))
    }

    #[tokio::test]
    async fn test_bootstrap_fails_on_malformed_row() {
        let mut bad = record(2, "bad");
        bad.attribute_mapping = json!({"mystery_attr1": "x"});
        let source = Arc::new(MemoryRegistrySource::new([record(1, "ok"), bad]));

        assert!(LayerCatalog::bootstrap(source).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_survives_later_writes() {
        let source = Arc::new(MemoryRegistrySource::new([record(1, "roads")]));
        let catalog = LayerCatalog::bootstrap(source.clone()).await.unwrap();

        let snapshot = catalog.get_all();
        source.put(record(1, "roads v2"));
        assert_eq!(catalog.upsert(id(1)).await.unwrap(), CatalogChange::Replaced);

        assert_eq!(snapshot[&id(1)].name, "roads");
        assert_eq!(catalog.get(&id(1)).unwrap().name, "roads v2");
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_entry() {
        let source = Arc::new(MemoryRegistrySource::new([record(1, "roads")]));
        let catalog = LayerCatalog::bootstrap(source.clone()).await.unwrap();

        let mut broken = record(1, "roads broken");
        broken.geometry_type = Some("hexagon".into());
        source.put(broken);

        assert!(catalog.upsert(id(1)).await.is_err());
        assert_eq!(catalog.get(&id(1)).unwrap().name, "roads");
    }

    #[tokio::test]
    async fn test_reload_replaces_map_and_keeps_broken_rows() {
        let source = Arc::new(MemoryRegistrySource::new([record(1, "roads"), record(2, "rivers")]));
        let catalog = LayerCatalog::bootstrap(source.clone()).await.unwrap();

        let mut broken = record(2, "rivers broken");
        broken.geometry_type = Some("hexagon".into());
        source.put(broken);
        source.put(record(3, "rails"));
        source.delete(id(1));

        assert_eq!(catalog.reload().await.unwrap(), 2);
        assert!(catalog.get(&id(1)).is_none());
        assert_eq!(catalog.get(&id(2)).unwrap().name, "rivers");
        assert_eq!(catalog.get(&id(3)).unwrap().name, "rails");

        source.set_unavailable(true);
        assert!(catalog.reload().await.is_err());
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_of_vanished_layer_is_noop() {
        let source = Arc::new(MemoryRegistrySource::new([]));
        let catalog = LayerCatalog::bootstrap(source).await.unwrap();

        assert_eq!(catalog.upsert(id(3)).await.unwrap(), CatalogChange::Unchanged);
        assert!(catalog.is_empty());
    }
}
