// GET handlers: version, host, current/latest/history per domain

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::history_repo::HostRecord;
use crate::models::{MetricKind, unix_millis};
use crate::platform::TemperatureSensor;
use crate::version::{NAME, VERSION};

const DEFAULT_HISTORY_HOURS: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("unknown metric kind: {0}")]
    UnknownKind(String),
    #[error("no {0} snapshot stored yet")]
    NotFound(MetricKind),
    #[error("host {0} is not registered")]
    UnknownHost(i64),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownKind(_) | ApiError::NotFound(_) | ApiError::UnknownHost(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                tracing::warn!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn parse_kind(raw: &str) -> Result<MetricKind, ApiError> {
    MetricKind::parse(raw).ok_or_else(|| ApiError::UnknownKind(raw.to_string()))
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct HealthQuery {
    #[serde(rename = "hostId", alias = "host_id")]
    host_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HealthResponse {
    status: &'static str,
    timestamp: u64,
    uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds_since_seen: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HostStatus {
    #[serde(flatten)]
    record: HostRecord,
    online: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct SensorsResponse {
    timestamp: u64,
    sensors: Vec<TemperatureSensor>,
}

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/host: identity registered at startup.
pub(super) async fn host_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.host.as_ref().clone())
}

/// GET /api/health: server uptime; with `hostId`, whether that host reported within the
/// online window.
pub(super) async fn health_handler(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Result<Json<HealthResponse>, ApiError> {
    let now = unix_millis();
    let mut health = HealthResponse {
        status: "ok",
        timestamp: now,
        uptime_secs: state.started_at.elapsed().as_secs(),
        host_id: None,
        last_seen: None,
        seconds_since_seen: None,
    };
    if let Some(id) = query.host_id {
        let host = state.hosts.get_host(id).await?.ok_or(ApiError::UnknownHost(id))?;
        health.status = if host.is_online(now) { "online" } else { "offline" };
        health.host_id = Some(host.id);
        health.last_seen = Some(host.last_seen);
        health.seconds_since_seen = Some(host.seconds_since_seen(now));
    }
    Ok(Json(health))
}

/// GET /api/hosts: every registered host with its online flag.
pub(super) async fn hosts_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<HostStatus>>, ApiError> {
    let now = unix_millis();
    let hosts = state
        .hosts
        .list_hosts()
        .await?
        .into_iter()
        .map(|record| HostStatus {
            online: record.is_online(now),
            record,
        })
        .collect();
    Ok(Json(hosts))
}

/// GET /api/sensors: raw temperature sensors, read now.
pub(super) async fn sensors_handler(
    State(state): State<AppState>,
) -> Result<Json<SensorsResponse>, ApiError> {
    if state.cancel.is_cancelled() {
        return Err(anyhow::anyhow!("sensor read cancelled").into());
    }
    let sensors = state.services.cpu.collector().sensors().await?;
    Ok(Json(SensorsResponse {
        timestamp: unix_millis(),
        sensors,
    }))
}

/// GET /api/system/current: every domain collected now, not persisted.
pub(super) async fn system_current_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.services.collect_all_current(&state.cancel).await)
}

pub(super) async fn current_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    let s = &state.services;
    let cancel = &state.cancel;
    Ok(match parse_kind(&kind)? {
        MetricKind::Cpu => Json(s.cpu.collect(cancel).await?).into_response(),
        MetricKind::Memory => Json(s.memory.collect(cancel).await?).into_response(),
        MetricKind::Disk => Json(s.disk.collect(cancel).await?).into_response(),
        MetricKind::Network => Json(s.network.collect(cancel).await?).into_response(),
        MetricKind::Docker => {
            Json(s.docker_overview(s.docker.collect(cancel).await?)).into_response()
        }
    })
}

pub(super) async fn latest_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    let s = &state.services;
    let kind = parse_kind(&kind)?;
    let body = match kind {
        MetricKind::Cpu => s.cpu.get_latest().await?.map(|m| Json(m).into_response()),
        MetricKind::Memory => s.memory.get_latest().await?.map(|m| Json(m).into_response()),
        MetricKind::Disk => s.disk.get_latest().await?.map(|m| Json(m).into_response()),
        MetricKind::Network => s.network.get_latest().await?.map(|m| Json(m).into_response()),
        MetricKind::Docker => s
            .docker
            .get_latest()
            .await?
            .map(|m| Json(s.docker_overview(m)).into_response()),
    };
    body.ok_or(ApiError::NotFound(kind))
}

pub(super) async fn history_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let s = &state.services;
    let kind = parse_kind(&kind)?;
    let hours = query.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    if !(hours.is_finite() && hours > 0.0) {
        return Err(ApiError::BadRequest(format!(
            "hours must be a positive number, got {}",
            hours
        )));
    }
    Ok(match kind {
        MetricKind::Cpu => Json(s.cpu.get_historical(hours).await?).into_response(),
        MetricKind::Memory => Json(s.memory.get_historical(hours).await?).into_response(),
        MetricKind::Disk => Json(s.disk.get_historical(hours).await?).into_response(),
        MetricKind::Network => Json(s.network.get_historical(hours).await?).into_response(),
        MetricKind::Docker => {
            let overviews: Vec<_> = s
                .docker
                .get_historical(hours)
                .await?
                .into_iter()
                .map(|m| s.docker_overview(m))
                .collect();
            Json(overviews).into_response()
        }
    })
}
