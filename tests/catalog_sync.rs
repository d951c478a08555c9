//! Catalog bootstrap and change application, driven through the public API
//! with an in-memory registry.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use geotile::catalog::{
    apply_stream, ApplyEvent, CatalogChange, CatalogEvent, CatalogError, EventKind, LayerCatalog,
    LayerDefinition, LayerId, LayerRecord, MemoryRegistrySource, RegistrySource, SyncMessage,
    SyncStats,
};
use serde_json::json;
use uuid::Uuid;

const OWNER: u128 = 0xabc;

fn record(n: u128, geometry_type: Option<&str>) -> LayerRecord {
    LayerRecord {
        id: Uuid::from_u128(n),
        owner: Uuid::from_u128(OWNER),
        name: format!("layer {}", n),
        attribute_mapping: json!({"text_attr1": "name", "integer_attr1": "rank"}),
        geometry_type: geometry_type.map(String::from),
        extent: None,
        sharded: false,
    }
}

fn payload(text: impl Into<String>) -> SyncMessage {
    SyncMessage::Payload(text.into())
}

fn id(n: u128) -> LayerId {
    LayerId::new(Uuid::from_u128(n))
}

async fn bootstrap() -> (Arc<MemoryRegistrySource>, LayerCatalog) {
    let source = Arc::new(MemoryRegistrySource::new([
        record(1, Some("point")),
        record(2, Some("polygon")),
        record(3, None),
    ]));
    let catalog = LayerCatalog::bootstrap(source.clone()).await.unwrap();
    (source, catalog)
}

#[tokio::test]
async fn test_locators_after_bootstrap() {
    let (_, catalog) = bootstrap().await;
    let owner = Uuid::from_u128(OWNER).simple().to_string();

    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.get(&id(1)).unwrap().locator(), format!("point_{}", owner));
    assert_eq!(catalog.get(&id(2)).unwrap().locator(), format!("polygon_{}", owner));
    assert_eq!(catalog.get(&id(3)).unwrap().locator(), format!("no_geometry_{}", owner));
}

#[tokio::test]
async fn test_update_replaces_only_its_entry() {
    let (source, catalog) = bootstrap().await;
    let before = catalog.get_all();

    let mut renamed = record(2, Some("polygon"));
    renamed.attribute_mapping = json!({"text_attr1": "label"});
    source.put(renamed);

    let change = catalog.apply(CatalogEvent::new(EventKind::Update, id(2))).await.unwrap();
    assert_eq!(change, CatalogChange::Replaced);

    let after = catalog.get_all();
    assert_eq!(after.len(), 3);
    assert!(Arc::ptr_eq(&before[&id(1)], &after[&id(1)]));
    assert!(Arc::ptr_eq(&before[&id(3)], &after[&id(3)]));
    assert!(after[&id(2)].attribute("label").is_some());

    // the old snapshot is untouched
    assert!(before[&id(2)].attribute("name").is_some());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (_, catalog) = bootstrap().await;
    let delete = CatalogEvent::new(EventKind::Delete, id(1));

    assert_eq!(catalog.apply(delete).await.unwrap(), CatalogChange::Removed);
    assert_eq!(catalog.apply(delete).await.unwrap(), CatalogChange::Unchanged);
    assert!(catalog.get(&id(1)).is_none());
    assert_eq!(catalog.len(), 2);
}

#[tokio::test]
async fn test_upsert_of_vanished_layer_is_noop() {
    let (source, catalog) = bootstrap().await;
    source.delete(id(3));

    let change = catalog.apply(CatalogEvent::new(EventKind::Update, id(3))).await.unwrap();
    assert_eq!(change, CatalogChange::Unchanged);
    assert!(catalog.get(&id(3)).is_some());
}

#[tokio::test]
async fn test_stream_survives_malformed_payloads() {
    let (source, catalog) = bootstrap().await;
    source.put(record(4, Some("line")));

    let payloads = stream::iter(vec![
        payload("garbage"),
        payload(format!("INSERT:{}", Uuid::from_u128(4))),
        payload(format!("TRUNCATE:{}", Uuid::from_u128(1))),
        payload("DELETE:not-a-uuid"),
        payload(format!("DELETE:user_data.{}", Uuid::from_u128(1).simple())),
    ]);

    let stats = apply_stream(&catalog, payloads).await;
    assert_eq!(
        stats,
        SyncStats {
            applied: 2,
            dropped: 3,
            failed: 0,
            resyncs: 0
        }
    );
    assert!(catalog.get(&id(4)).is_some());
    assert!(catalog.get(&id(1)).is_none());
}

#[tokio::test]
async fn test_events_apply_in_arrival_order() {
    let (source, catalog) = bootstrap().await;
    source.put(record(5, Some("point")));

    let layer = Uuid::from_u128(5);
    let payloads = stream::iter(vec![
        payload(format!("INSERT:{}", layer)),
        payload(format!("DELETE:{}", layer)),
    ]);
    apply_stream(&catalog, payloads).await;

    assert!(catalog.get(&id(5)).is_none());
}

#[tokio::test]
async fn test_failed_upsert_keeps_previous_entry() {
    let (source, catalog) = bootstrap().await;
    source.set_unavailable(true);

    let payloads = stream::iter(vec![payload(format!("UPDATE:{}", Uuid::from_u128(2)))]);
    let stats = apply_stream(&catalog, payloads).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.resyncs, 0);
    assert!(catalog.get(&id(2)).is_some());
}

async fn assert_matches_source(catalog: &LayerCatalog, source: &MemoryRegistrySource) {
    let records = source.scan_all().await.unwrap();
    assert_eq!(catalog.len(), records.len());
    for record in &records {
        let expected = LayerDefinition::from_record(record).unwrap();
        assert_eq!(catalog.get(&expected.id).as_deref(), Some(&expected));
    }
}

#[tokio::test]
async fn test_resync_catches_up_with_missed_changes() {
    let (source, catalog) = bootstrap().await;

    // changes made while no notification could be received
    source.put(record(6, Some("line")));
    source.delete(id(1));
    let mut renamed = record(2, Some("polygon"));
    renamed.name = "renamed".into();
    source.put(renamed);

    let stats = apply_stream(&catalog, stream::iter(vec![SyncMessage::Resync])).await;

    assert_eq!(stats.resyncs, 1);
    assert_matches_source(&catalog, &source).await;
}

#[tokio::test]
async fn test_failed_update_recovered_by_resync() {
    let (source, catalog) = bootstrap().await;
    let mut renamed = record(2, Some("polygon"));
    renamed.name = "renamed".into();
    source.put(renamed);
    source.put(record(7, Some("point")));
    source.set_unavailable(true);

    // the registry comes back before the second message arrives
    let registry = Arc::clone(&source);
    let messages = stream::iter(vec![
        payload(format!("UPDATE:{}", Uuid::from_u128(2))),
        payload(format!("DELETE:{}", Uuid::from_u128(9))),
    ])
    .enumerate()
    .map(move |(i, message)| {
        if i == 1 {
            registry.set_unavailable(false);
        }
        message
    });

    let stats = apply_stream(&catalog, messages).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.resyncs, 1);
    assert_eq!(catalog.get(&id(2)).unwrap().name, "renamed");
    assert_matches_source(&catalog, &source).await;
}
