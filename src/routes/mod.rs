// Read-only HTTP routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::history_repo::HostRegistry;
use crate::models::HostInfo;
use crate::service::MetricServices;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) services: Arc<MetricServices>,
    pub(crate) hosts: Arc<dyn HostRegistry>,
    pub(crate) host: Arc<HostInfo>,
    pub(crate) cancel: CancellationToken,
    pub(crate) started_at: Instant,
}

pub fn app(
    services: Arc<MetricServices>,
    hosts: Arc<dyn HostRegistry>,
    host: Arc<HostInfo>,
    cancel: CancellationToken,
) -> Router {
    let state = AppState {
        services,
        hosts,
        host,
        cancel,
        started_at: Instant::now(),
    };
    Router::new()
        .route("/", get(|| async { "hoststats is running" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/health", get(http::health_handler)) // GET /api/health?hostId=
        .route("/api/host", get(http::host_handler)) // GET /api/host
        .route("/api/hosts", get(http::hosts_handler)) // GET /api/hosts
        .route("/api/sensors", get(http::sensors_handler)) // GET /api/sensors
        .route("/api/system/current", get(http::system_current_handler)) // GET /api/system/current
        .route("/api/{kind}/current", get(http::current_handler)) // GET /api/{kind}/current
        .route("/api/{kind}/latest", get(http::latest_handler)) // GET /api/{kind}/latest
        .route("/api/{kind}/history", get(http::history_handler)) // GET /api/{kind}/history?hours=
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
