//! Strategy selection and SQL shape of tile plans, driven through the
//! public planner API with a scripted store.

use geotile::catalog::{LayerDefinition, LayerRecord};
use geotile::planner::{MergeMode, PlannerSettings, Strategy, TileError, TilePlanner, TileRequest};
use geotile::sql::{Expr, SqlValue, Statement};
use geotile::store::ScriptedTileStore;
use geotile::tiles::{Tile, TileCoord, TileMatrixSet};
use serde_json::json;
use uuid::Uuid;

fn layer(n: u128, geometry_type: &str, sharded: bool) -> LayerDefinition {
    LayerDefinition::from_record(&LayerRecord {
        id: Uuid::from_u128(n),
        owner: Uuid::from_u128(0xfeed),
        name: format!("layer {}", n),
        attribute_mapping: json!({"text_attr1": "name", "float_attr1": "height"}),
        geometry_type: Some(geometry_type.into()),
        extent: None,
        sharded,
    })
    .unwrap()
}

fn request(layer: &LayerDefinition, z: u8, x: u32, y: u32, limit: i64) -> TileRequest {
    let mut request = TileRequest::new(
        layer.id,
        Tile::new(TileMatrixSet::WebMercatorQuad, TileCoord::new(z, x, y)).unwrap(),
    );
    request.limit = Some(limit);
    request
}

fn clustering_store(layer: &LayerDefinition, count: i64) -> ScriptedTileStore {
    let layout = PlannerSettings::default().layout;
    ScriptedTileStore::new().with_count(count).with_columns(
        &layer.table(&layout),
        &["id", "layer_id", "geom", "h3_3", "cluster_keep", "h3_group"],
    )
}

fn planner() -> TilePlanner {
    TilePlanner::new(PlannerSettings::default())
}

#[tokio::test]
async fn test_dense_point_tile_is_clustered() {
    let points = layer(1, "point", false);
    let store = clustering_store(&points, 1500);

    let plan = planner()
        .plan(&store, &points, &request(&points, 5, 10, 12, 1000))
        .await
        .unwrap();

    let expected = PlannerSettings::default().clustering.resolution_for(5).unwrap();
    assert_eq!(plan.strategy, Strategy::Clustered { resolution: expected });
    assert_eq!(plan.merge, MergeMode::Single);

    let sql = Statement::select(&plan.subqueries[0]).sql;
    assert!(sql.contains(&format!("GROUP BY h3_cell_to_parent(\"h3_group\", {})", expected)));
    assert!(sql.contains("\"cluster_keep\" = TRUE"));
    assert!(sql.ends_with("LIMIT 1000"));
}

#[tokio::test]
async fn test_sparse_point_tile_is_raw_and_unordered() {
    let points = layer(1, "point", false);
    let store = clustering_store(&points, 400);

    let plan = planner()
        .plan(&store, &points, &request(&points, 5, 10, 12, 1000))
        .await
        .unwrap();

    assert_eq!(plan.strategy, Strategy::Raw);
    let sql = Statement::select(&plan.subqueries[0]).sql;
    assert!(!sql.contains("ORDER BY"));
    assert!(!sql.contains("GROUP BY"));
    assert!(sql.ends_with("LIMIT 1000"));
}

#[tokio::test]
async fn test_polygon_tile_ordered_by_area() {
    let polygons = layer(2, "polygon", false);
    let store = ScriptedTileStore::new();

    let plan = planner()
        .plan(&store, &polygons, &request(&polygons, 14, 8000, 5000, 250))
        .await
        .unwrap();

    assert_eq!(plan.strategy, Strategy::Raw);
    let sql = Statement::select(&plan.subqueries[0]).sql;
    assert!(sql.ends_with("ORDER BY ST_Area(\"geom\") DESC LIMIT 250"), "{}", sql);
    assert!(store.statements().is_empty());
}

#[tokio::test]
async fn test_clustering_stops_at_threshold_zoom() {
    let points = layer(1, "point", false);
    let store = clustering_store(&points, 1_000_000);
    let threshold = PlannerSettings::default().clustering.max_zoom;

    let plan = planner()
        .plan(&store, &points, &request(&points, threshold, 0, 0, 1000))
        .await
        .unwrap();
    assert_eq!(plan.strategy, Strategy::Raw);
}

#[tokio::test]
async fn test_sharded_plan_covers_every_shard_once() {
    let sharded = layer(3, "polygon", true);
    let store = ScriptedTileStore::new().with_keys([12, 11, 12]);

    let plan = planner()
        .plan(&store, &sharded, &request(&sharded, 6, 20, 30, 500))
        .await
        .unwrap();

    assert_eq!(plan.strategy, Strategy::Sharded { keys: vec![11, 12] });
    assert_eq!(plan.merge, MergeMode::UnionAll);
    assert_eq!(plan.subqueries.len(), 2);

    // every part is the unsharded predicate plus exactly one shard equality
    let unsharded = layer(3, "polygon", false);
    let single = planner()
        .plan(&ScriptedTileStore::new(), &unsharded, &request(&unsharded, 6, 20, 30, 500))
        .await
        .unwrap();
    let Some(Expr::And(base)) = single.subqueries[0].filter.clone() else {
        panic!("unsharded predicate is not a conjunction");
    };

    for (part, key) in plan.subqueries.iter().zip([11, 12]) {
        let Some(Expr::And(clauses)) = part.filter.clone() else {
            panic!("shard predicate is not a conjunction");
        };
        let (shard, rest) = clauses.split_last().unwrap();
        assert_eq!(rest, base.as_slice());
        assert_eq!(shard, &Expr::col("h3_3").eq(Expr::value(SqlValue::Int(key))));
    }

    let full = plan.to_statement().unwrap().sql;
    assert_eq!(full.matches(" UNION ALL ").count(), 1);
    assert!(full.contains(") LIMIT 500) AS \"t\""));
}

#[tokio::test]
async fn test_sharded_tile_without_shards_is_empty() {
    let sharded = layer(3, "line", true);
    let store = ScriptedTileStore::new();

    let plan = planner()
        .plan(&store, &sharded, &request(&sharded, 2, 1, 1, 100))
        .await
        .unwrap();

    assert!(plan.is_empty());
    assert!(plan.to_statement().is_none());
}

#[tokio::test]
async fn test_limit_over_maximum_always_rejected() {
    let maximum = i64::from(PlannerSettings::default().tiles.max_features_per_tile);

    for sharded in [false, true] {
        let layer = layer(4, "point", sharded);
        let store = ScriptedTileStore::new().with_keys([1]);

        let err = planner()
            .plan(&store, &layer, &request(&layer, 3, 1, 1, maximum + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TileError::InvalidLimit { .. }));
        assert!(store.statements().is_empty());
    }
}

#[tokio::test]
async fn test_unknown_filter_property_never_dropped() {
    let polygons = layer(2, "polygon", false);
    let store = ScriptedTileStore::new();

    let mut req = request(&polygons, 3, 1, 1, 10);
    req.filter.properties.push(("colour".into(), json!("red")));

    let err = planner().plan(&store, &polygons, &req).await.unwrap_err();
    assert_eq!(err.code(), "InvalidPropertyName");
    assert_eq!(err.status_code(), 400);
}
