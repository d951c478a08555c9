//! Tile and health routes
//!
//! `GET /collections/{collection_id}/tiles/{matrix_set}/{z}/{x}/{y}`
//!
//! Recognised query parameters are `filter`, `properties`, `geom-column`,
//! `limit`, `ids`, `bbox`, `datetime`, `datetime-column` and `explain`.
//! Any other parameter is an equality filter on the attribute of that name.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::catalog::LayerId;
use crate::executor::TileService;
use crate::filter::{parse_bbox, DatetimeRange, FilterError, FilterNode};
use crate::planner::{ExplainPlan, TileError, TileRequest, TileResult};
use crate::tiles::{Tile, TileCoord, TileMatrixSet};

/// Content type of an encoded tile
pub const MVT_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

const RESERVED_PARAMS: &[&str] = &[
    "filter",
    "properties",
    "geom-column",
    "limit",
    "ids",
    "bbox",
    "datetime",
    "datetime-column",
    "explain",
    "f",
];

type TilePath = (String, String, String, String, String);

pub fn tile_routes(service: Arc<TileService>) -> Router {
    Router::new()
        .route(
            "/collections/:collection_id/tiles/:matrix_set/:z/:x/:y",
            get(tile_handler),
        )
        .with_state(service)
}

pub fn health_routes() -> Router {
    Router::new().route("/healthz", get(health_handler))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"ping": "pong"})))
}

async fn tile_handler(
    State(service): State<Arc<TileService>>,
    Path((collection_id, matrix_set, z, x, y)): Path<TilePath>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let request = match parse_request(&collection_id, &matrix_set, (&z, &x, &y), &params) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    if params.get("explain").is_some_and(|v| is_truthy(v)) {
        let explain = match service.plan(&request).await {
            Ok(plan) => plan.explain(),
            Err(err) => ExplainPlan::from_error(&err),
        };
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            explain.to_string(),
        )
            .into_response();
    }

    match service.fetch_tile(&request).await {
        Ok(Some(bytes)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, MVT_CONTENT_TYPE)],
            bytes,
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "" | "1" | "true" | "yes")
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Builds a tile request from path segments and query parameters
pub fn parse_request(
    collection_id: &str,
    matrix_set: &str,
    (z, x, y): (&str, &str, &str),
    params: &BTreeMap<String, String>,
) -> TileResult<TileRequest> {
    let layer_id: LayerId = collection_id
        .parse()
        .map_err(|_| TileError::LayerNotFound(collection_id.to_string()))?;

    let matrix_set: TileMatrixSet = matrix_set.parse()?;
    let tile = Tile::new(matrix_set, TileCoord::parse(z, x, y)?)?;

    let mut request = TileRequest::new(layer_id, tile);

    for (key, value) in params {
        match key.as_str() {
            "filter" => request.filter.expression = Some(FilterNode::from_json(value)?),
            "properties" => {
                let names = comma_list(value);
                if !names.is_empty() {
                    request.properties = Some(names);
                }
            }
            "geom-column" => request.geometry_column = Some(value.clone()),
            "limit" => {
                let limit = value.trim().parse::<i64>().map_err(|_| {
                    FilterError::invalid(format!("limit '{}' is not an integer", value))
                })?;
                request.limit = Some(limit);
            }
            "ids" => request.filter.ids = Some(comma_list(value)),
            "bbox" => request.filter.bbox = Some(parse_bbox(value)?),
            "datetime" => request.filter.datetime = Some(DatetimeRange::parse(value)?),
            "datetime-column" => request.filter.datetime_column = Some(value.clone()),
            reserved if RESERVED_PARAMS.contains(&reserved) => {}
            name => request
                .filter
                .properties
                .push((name.to_string(), Value::String(value.clone()))),
        }
    }

    Ok(request)
}
