//! HTTP server
//!
//! Combines the tile and health routers behind CORS and request tracing.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::config::HttpServerConfig;
use super::tile_routes::{health_routes, tile_routes};
use crate::executor::TileService;
use crate::observability::Event;

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, service: Arc<TileService>) -> Self {
        let router = Self::build_router(&config, service);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, service: Arc<TileService>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .merge(tile_routes(service))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests
    pub async fn start<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        info!(event = %Event::Serving, addr = %addr, "tile server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LayerCatalog, LayerRecord, MemoryRegistrySource};
    use crate::planner::{PlannerSettings, TilePlanner};
    use crate::store::ScriptedTileStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    const LAYER: &str = "user_data.0000000000000000000000000000000a";

    async fn router(store: ScriptedTileStore) -> Router {
        let source = Arc::new(MemoryRegistrySource::new([LayerRecord {
            id: Uuid::from_u128(10),
            owner: Uuid::from_u128(1),
            name: "roads".into(),
            attribute_mapping: json!({"text_attr1": "name"}),
            geometry_type: Some("line".into()),
            extent: None,
            sharded: false,
        }]));
        let catalog = Arc::new(LayerCatalog::bootstrap(source).await.unwrap());
        let service = TileService::new(
            catalog,
            Arc::new(store),
            TilePlanner::new(PlannerSettings::default()),
        );
        HttpServer::new(HttpServerConfig::default(), Arc::new(service)).router()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = router(ScriptedTileStore::new()).await.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"ping": "pong"}));
    }

    #[tokio::test]
    async fn test_tile_bytes() {
        let app = router(ScriptedTileStore::new().with_tile(vec![7, 7, 7])).await;
        let uri = format!("/collections/{}/tiles/WebMercatorQuad/3/1/2", LAYER);
        let response = app.oneshot(get(&uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.mapbox-vector-tile"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[7, 7, 7]);
    }

    #[tokio::test]
    async fn test_empty_tile_is_no_content() {
        let app = router(ScriptedTileStore::new()).await;
        let uri = format!("/collections/{}/tiles/WebMercatorQuad/3/1/2", LAYER);
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_property_is_bad_request() {
        let app = router(ScriptedTileStore::new()).await;
        let uri = format!("/collections/{}/tiles/WebMercatorQuad/3/1/2?colour=red", LAYER);
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["kind"], "InvalidPropertyName");
        assert_eq!(value["code"], 400);
    }

    #[tokio::test]
    async fn test_unknown_layer_is_not_found() {
        let app = router(ScriptedTileStore::new()).await;
        let uri = "/collections/user_data.ffffffffffffffffffffffffffffffff/tiles/WebMercatorQuad/0/0/0";
        let response = app.oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_explain() {
        let app = router(ScriptedTileStore::new()).await;
        let uri = format!("/collections/{}/tiles/WebMercatorQuad/3/1/2?explain=true", LAYER);
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("=== TILE PLAN ==="));
        assert!(text.contains("Strategy: raw"));
    }
}
