// Docker container models

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// Docker container state; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from Docker API state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }
}

/// Published port. `public_port` is 0 when the port is not bound on the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct DockerPort {
    pub private_port: u16,
    pub public_port: u16,
    #[serde(rename = "type")]
    pub port_type: String,
    pub ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStats {
    /// Share of total host CPU time between two consecutive observations.
    pub cpu_percent: f64,
    /// Effective CPU limit in cores; 0 when the container is unconstrained.
    pub cpu_limit: f64,
    /// Usage relative to the CPU limit, or to the host core count when unconstrained.
    pub cpu_percent_of_limit: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
    pub pids: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSnapshot {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub status: String,
    pub ports: Vec<DockerPort>,
    pub stats: ResourceStats,
    /// RFC 3339.
    pub created: String,
    /// RFC 3339, or empty when the container never finished.
    pub finished_at: String,
}

impl ContainerSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

/// Persisted Docker domain snapshot. Stacks are derived on retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct DockerMetric {
    pub timestamp: u64,
    pub containers: Vec<ContainerSnapshot>,
    pub total_containers: u32,
    pub running_containers: u32,
    pub docker_available: bool,
    /// Empty when collection succeeded.
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerStack {
    pub name: String,
    pub containers: Vec<ContainerSnapshot>,
    pub total_containers: u32,
    pub running_containers: u32,
}

/// Retrieval-time view of a [`DockerMetric`] with containers grouped into stacks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerOverview {
    pub timestamp: u64,
    pub stacks: Vec<DockerStack>,
    pub total_containers: u32,
    pub running_containers: u32,
    pub docker_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
