// Container runtime client: trait seam and the bollard-backed implementation

mod stats;

pub use stats::resource_stats;

use crate::models::DockerPort;
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tracing::instrument;

/// Daemon sentinel for "never finished".
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("docker api: {0}")]
    Api(#[from] bollard::errors::Error),
    #[error("container {0}: stats stream ended without a sample")]
    NoStats(String),
    #[error("{0}")]
    Other(String),
}

/// One entry of the container list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeContainer {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: Vec<DockerPort>,
}

/// Inspect fields the collector needs. Times are already RFC 3339.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetails {
    pub nano_cpus: i64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub created: String,
    /// Empty when the container never finished.
    pub finished_at: String,
}

impl ContainerDetails {
    /// Effective CPU limit in cores: NanoCPUs, else quota/period, else 0 (unconstrained).
    pub fn cpu_limit(&self) -> f64 {
        if self.nano_cpus > 0 {
            self.nano_cpus as f64 / 1e9
        } else if self.cpu_quota > 0 && self.cpu_period > 0 {
            self.cpu_quota as f64 / self.cpu_period as f64
        } else {
            0.0
        }
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn list_containers(&self, all: bool) -> Result<Vec<RuntimeContainer>, RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// A single stats reading carrying both the current and the previous CPU sample.
    async fn container_stats(&self, id: &str) -> Result<ContainerStatsResponse, RuntimeError>;
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    /// Connects using DOCKER_HOST or the platform default socket. The connection is lazy;
    /// reachability is checked by `ping`.
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRepo {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    async fn list_containers(&self, all: bool) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        let options = ListContainersOptions {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .iter()
            .map(|c| {
                let raw = serde_json::to_value(c).unwrap_or(Value::Null);
                RuntimeContainer {
                    id: c.id.clone().unwrap_or_default(),
                    names: c.names.clone().unwrap_or_default(),
                    image: c.image.clone().unwrap_or_default(),
                    state: raw["State"].as_str().unwrap_or_default().to_string(),
                    status: c.status.clone().unwrap_or_default(),
                    ports: raw["Ports"]
                        .as_array()
                        .map(|ports| ports.iter().map(port_from_json).collect())
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "inspect_container"))]
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let raw = serde_json::to_value(&info).unwrap_or(Value::Null);
        let host_config = info.host_config.as_ref();
        Ok(ContainerDetails {
            nano_cpus: host_config.and_then(|h| h.nano_cpus).unwrap_or(0),
            cpu_quota: host_config.and_then(|h| h.cpu_quota).unwrap_or(0),
            cpu_period: host_config.and_then(|h| h.cpu_period).unwrap_or(0),
            created: normalize_created(raw["Created"].as_str().unwrap_or_default(), Utc::now()),
            finished_at: normalize_finished(raw["State"]["FinishedAt"].as_str().unwrap_or_default()),
        })
    }

    async fn container_stats(&self, id: &str) -> Result<ContainerStatsResponse, RuntimeError> {
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let mut stream = self.docker.stats(id, Some(options));
        match stream.next().await {
            Some(result) => Ok(result?),
            None => Err(RuntimeError::NoStats(id.to_string())),
        }
    }
}

fn port_from_json(p: &Value) -> DockerPort {
    DockerPort {
        private_port: p["PrivatePort"].as_u64().unwrap_or(0) as u16,
        public_port: p["PublicPort"].as_u64().unwrap_or(0) as u16,
        port_type: p["Type"].as_str().unwrap_or_default().to_string(),
        ip: p["IP"].as_str().unwrap_or_default().to_string(),
    }
}

/// RFC 3339 creation time; an empty or unparsable value falls back to `now`.
pub(crate) fn normalize_created(raw: &str, now: DateTime<Utc>) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RFC 3339 finish time, or empty for containers that never finished.
pub(crate) fn normalize_finished(raw: &str) -> String {
    if raw.is_empty() || raw == ZERO_TIME {
        return String::new();
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) if t.timestamp() > 0 => t
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        _ => String::new(),
    }
}
