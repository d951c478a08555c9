//! Tile query planner
//!
//! Steps, in order:
//! 1. Resolve the geometry column (requested override or the default)
//! 2. Validate the row limit against the configured maximum
//! 3. Compile the request filters
//! 4. Pick a strategy: sharded layers fan out over the shard keys under the
//!    tile; dense low-zoom point tiles are clustered; everything else is raw
//!
//! Given the same layer definition, request and store answers the planner
//! always produces the same plan.

use tracing::debug;

use super::cluster::ClusterAggregator;
use super::density::DensityProber;
use super::errors::{TileError, TileResult};
use super::plan::{MergeMode, Strategy, TilePlan, TileWrap, GEOMETRY_ALIAS};
use crate::catalog::{Attribute, GeometryType, LayerDefinition, LayerId};
use crate::config::{ClusteringSettings, ServiceConfig, StorageLayout, TileSettings};
use crate::filter::{FilterError, FilterSpec, PredicateCompiler};
use crate::observability::Event;
use crate::sql::{Expr, OrderBy, Projection, Select, SqlType, Statement};
use crate::store::TileStore;
use crate::tiles::Tile;

/// Configuration the planner works from
#[derive(Debug, Clone, Default)]
pub struct PlannerSettings {
    pub tiles: TileSettings,
    pub clustering: ClusteringSettings,
    pub layout: StorageLayout,
}

impl PlannerSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            tiles: config.tiles.clone(),
            clustering: config.clustering.clone(),
            layout: config.storage.clone(),
        }
    }
}

/// One tile fetch
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub layer_id: LayerId,
    pub tile: Tile,
    /// Filters besides the tile envelope
    pub filter: FilterSpec,
    /// Exposed attribute names to include; all attributes when `None`
    pub properties: Option<Vec<String>>,
    pub geometry_column: Option<String>,
    pub limit: Option<i64>,
}

impl TileRequest {
    pub fn new(layer_id: LayerId, tile: Tile) -> Self {
        Self {
            layer_id,
            tile,
            filter: FilterSpec::default(),
            properties: None,
            geometry_column: None,
            limit: None,
        }
    }
}

pub struct TilePlanner {
    settings: PlannerSettings,
}

impl TilePlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Plans a tile. The store answers the density probe and the shard
    /// discovery query; the tile query itself is not run.
    pub async fn plan(
        &self,
        store: &dyn TileStore,
        layer: &LayerDefinition,
        request: &TileRequest,
    ) -> TileResult<TilePlan> {
        // 1. Geometry column
        let geometry = self.resolve_geometry_column(layer, request.geometry_column.as_deref())?;

        // 2. Row limit
        let limit = self.validate_limit(request.limit)?;

        // 3. Filters; unknown names fail here, before any query runs
        let attributes = self.select_attributes(layer, request.properties.as_deref())?;
        let filter = request.filter.clone().with_tile(request.tile);
        let compiler = PredicateCompiler::new(layer, &self.settings.layout);
        let predicate = compiler.compile(&filter, Some(geometry))?;

        // 4. Strategy
        let (strategy, subqueries, merge) = if layer.sharded {
            let keys = self.discover_shards(store, &compiler, &request.tile).await?;
            let mut parts = Vec::with_capacity(keys.len());
            for key in &keys {
                let predicate = compiler.compile(&filter.clone().with_shard_key(*key), Some(geometry))?;
                parts.push(self.raw(layer, &request.tile, geometry, &attributes, predicate, limit));
            }
            (Strategy::Sharded { keys }, parts, MergeMode::UnionAll)
        } else {
            let density = DensityProber::new(store, &self.settings)
                .probe(layer, &request.tile, geometry, limit)
                .await?;
            debug!(layer_id = %layer.id, tile = %request.tile, density = ?density, "density probed");

            match density.cluster_resolution() {
                Some(resolution) => {
                    let select = ClusterAggregator::new(&self.settings.layout).build(
                        layer.table(&self.settings.layout),
                        predicate,
                        &attributes,
                        resolution,
                        limit,
                        |geom| self.encode_geometry(geom, &request.tile),
                    );
                    (Strategy::Clustered { resolution }, vec![select], MergeMode::Single)
                }
                None => {
                    let select = self.raw(layer, &request.tile, geometry, &attributes, predicate, limit);
                    (Strategy::Raw, vec![select], MergeMode::Single)
                }
            }
        };

        debug!(
            event = %Event::TilePlanned,
            layer_id = %layer.id,
            tile = %request.tile,
            strategy = %strategy,
            subqueries = subqueries.len()
        );

        Ok(TilePlan {
            layer_id: layer.id,
            tile: request.tile,
            strategy,
            subqueries,
            merge,
            limit,
            wrap: TileWrap {
                layer_name: self.settings.tiles.layer_name.clone(),
                extent: self.settings.tiles.extent,
            },
        })
    }

    fn resolve_geometry_column<'l>(
        &'l self,
        layer: &LayerDefinition,
        requested: Option<&str>,
    ) -> TileResult<&'l str> {
        let default = self.settings.layout.geometry_column.as_str();
        if !layer.has_geometry() {
            return Err(TileError::InvalidGeometryColumnName(
                requested.unwrap_or(default).to_string(),
            ));
        }
        match requested {
            None => Ok(default),
            Some(name) if name == default => Ok(default),
            Some(name) => Err(TileError::InvalidGeometryColumnName(name.to_string())),
        }
    }

    fn validate_limit(&self, requested: Option<i64>) -> TileResult<i64> {
        let maximum = i64::from(self.settings.tiles.max_features_per_tile);
        let limit = requested.unwrap_or_else(|| i64::from(self.settings.tiles.default_limit));
        if limit < 1 || limit > maximum {
            return Err(TileError::InvalidLimit {
                requested: limit,
                maximum,
            });
        }
        Ok(limit)
    }

    fn select_attributes<'l>(
        &self,
        layer: &'l LayerDefinition,
        requested: Option<&[String]>,
    ) -> TileResult<Vec<&'l Attribute>> {
        let Some(names) = requested else {
            return Ok(layer.attributes.iter().collect());
        };
        names
            .iter()
            .map(|name| {
                layer
                    .attribute(name)
                    .ok_or_else(|| TileError::from(FilterError::InvalidPropertyName(name.clone())))
            })
            .collect()
    }

    /// `SELECT CAST(key AS bigint) FROM <shard index> WHERE <tile intersects cell>`
    pub fn shard_statement(&self, compiler: &PredicateCompiler<'_>, tile: &Tile) -> Statement {
        let layout = &self.settings.layout;
        let select = Select::from_table(layout.shard_index())
            .project(Projection::new(
                Expr::col(layout.shard_index_key_column.as_str()).cast(SqlType::BigInt),
            ))
            .filter(compiler.tile_clause(tile, &layout.shard_index_geometry_column));
        Statement::select(&select)
    }

    async fn discover_shards(
        &self,
        store: &dyn TileStore,
        compiler: &PredicateCompiler<'_>,
        tile: &Tile,
    ) -> TileResult<Vec<i64>> {
        let mut keys = store.fetch_keys(&self.shard_statement(compiler, tile)).await?;
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// `ST_AsMVTGeom(ST_Transform(geom, <tms srid>), <tile bounds>, extent, buffer, true)`
    fn encode_geometry(&self, geometry: Expr, tile: &Tile) -> Expr {
        let srid = tile.matrix_set.srid();
        Expr::func(
            "ST_AsMVTGeom",
            vec![
                Expr::func("ST_Transform", vec![geometry, Expr::Int(i64::from(srid))]),
                Expr::envelope(tile.native_bounds().to_array(), srid),
                Expr::Int(i64::from(self.settings.tiles.extent)),
                Expr::Int(i64::from(self.settings.tiles.buffer)),
                Expr::Bool(true),
            ],
        )
    }

    /// Declared attributes, id and encoded geometry; longer lines and larger
    /// polygons first so truncation drops the small ones
    fn raw(
        &self,
        layer: &LayerDefinition,
        tile: &Tile,
        geometry: &str,
        attributes: &[&Attribute],
        predicate: Expr,
        limit: i64,
    ) -> Select {
        let layout = &self.settings.layout;

        let mut projection: Vec<Projection> = attributes
            .iter()
            .map(|a| Projection::aliased(Expr::col(a.column.as_str()), a.name.as_str()))
            .collect();
        projection.push(Projection::new(Expr::col(layout.id_column.as_str())));
        projection.push(Projection::aliased(
            self.encode_geometry(Expr::col(geometry), tile),
            GEOMETRY_ALIAS,
        ));

        let select = Select::from_table(layer.table(layout))
            .with_projection(projection)
            .filter(predicate);

        let select = match layer.geometry_type {
            Some(GeometryType::Line) => {
                select.order_by(OrderBy::desc(Expr::func("ST_Length", vec![Expr::col(geometry)])))
            }
            Some(GeometryType::Polygon) => {
                select.order_by(OrderBy::desc(Expr::func("ST_Area", vec![Expr::col(geometry)])))
            }
            _ => select,
        };

        select.limit(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LayerRecord;
    use crate::store::ScriptedTileStore;
    use crate::tiles::{TileCoord, TileMatrixSet};
    use serde_json::json;
    use uuid::Uuid;

    fn layer(geometry_type: Option<&str>, sharded: bool) -> LayerDefinition {
        LayerDefinition::from_record(&LayerRecord {
            id: Uuid::from_u128(0x11),
            owner: Uuid::from_u128(0x22),
            name: "layer".into(),
            attribute_mapping: json!({"text_attr1": "name", "integer_attr1": "rank"}),
            geometry_type: geometry_type.map(String::from),
            extent: None,
            sharded,
        })
        .unwrap()
    }

    fn request(layer: &LayerDefinition, z: u8, x: u32, y: u32) -> TileRequest {
        TileRequest::new(
            layer.id,
            Tile::new(TileMatrixSet::WebMercatorQuad, TileCoord::new(z, x, y)).unwrap(),
        )
    }

    fn planner() -> TilePlanner {
        TilePlanner::new(PlannerSettings::default())
    }

    #[tokio::test]
    async fn test_geometry_column_override() {
        let layer = layer(Some("line"), false);
        let store = ScriptedTileStore::new();

        let mut req = request(&layer, 3, 1, 1);
        req.geometry_column = Some("the_geom".into());
        let err = planner().plan(&store, &layer, &req).await.unwrap_err();
        assert!(matches!(err, TileError::InvalidGeometryColumnName(name) if name == "the_geom"));

        req.geometry_column = Some("geom".into());
        assert!(planner().plan(&store, &layer, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_layer_without_geometry_rejected() {
        let layer = layer(None, false);
        let store = ScriptedTileStore::new();
        let err = planner()
            .plan(&store, &layer, &request(&layer, 3, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TileError::InvalidGeometryColumnName(_)));
    }

    #[tokio::test]
    async fn test_limit_bounds() {
        let layer = layer(Some("line"), false);
        let store = ScriptedTileStore::new();

        for bad in [0, -1, 20_001] {
            let mut req = request(&layer, 3, 1, 1);
            req.limit = Some(bad);
            let err = planner().plan(&store, &layer, &req).await.unwrap_err();
            assert!(matches!(err, TileError::InvalidLimit { requested, maximum: 20_000 } if requested == bad));
        }

        let plan = planner().plan(&store, &layer, &request(&layer, 3, 1, 1)).await.unwrap();
        assert_eq!(plan.limit, 10_000);
    }

    #[tokio::test]
    async fn test_unknown_requested_property() {
        let layer = layer(Some("line"), false);
        let store = ScriptedTileStore::new();
        let mut req = request(&layer, 3, 1, 1);
        req.properties = Some(vec!["name".into(), "colour".into()]);

        let err = planner().plan(&store, &layer, &req).await.unwrap_err();
        assert_eq!(err.code(), "InvalidPropertyName");
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn test_raw_line_ordered_by_length() {
        let layer = layer(Some("line"), false);
        let store = ScriptedTileStore::new();
        let mut req = request(&layer, 3, 1, 1);
        req.properties = Some(vec!["rank".into()]);

        let plan = planner().plan(&store, &layer, &req).await.unwrap();
        assert_eq!(plan.strategy, Strategy::Raw);

        let sql = Statement::select(&plan.subqueries[0]).sql;
        assert!(sql.starts_with("SELECT \"integer_attr1\" AS \"rank\", \"id\", ST_AsMVTGeom(ST_Transform(\"geom\", 3857)"), "{}", sql);
        assert!(sql.ends_with("ORDER BY ST_Length(\"geom\") DESC LIMIT 10000"), "{}", sql);
    }

    #[tokio::test]
    async fn test_shard_discovery_statement() {
        let layer = layer(Some("polygon"), true);
        let store = ScriptedTileStore::new().with_keys([7, 3, 7]);

        let plan = planner().plan(&store, &layer, &request(&layer, 4, 2, 3)).await.unwrap();
        assert_eq!(plan.strategy, Strategy::Sharded { keys: vec![3, 7] });
        assert_eq!(plan.merge, MergeMode::UnionAll);

        let discovery = &store.statements()[0].sql;
        assert!(discovery.starts_with(
            "SELECT CAST(\"h3_short\" AS bigint) FROM \"basic\".\"h3_3_grid\" WHERE ST_Intersects("
        ));
    }
}
