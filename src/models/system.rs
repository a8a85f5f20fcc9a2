// CPU, memory, host identity and the merged system snapshot

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use super::{DiskMetric, DockerOverview, NetworkMetric};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetric {
    pub timestamp: u64,
    pub usage_percent: f64,
    pub cores: u32,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
    /// Degrees Celsius; 0 when no plausible sensor reading exists.
    pub temperature: f64,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetric {
    pub timestamp: u64,
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub usage_percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// Identity of the sampled machine. Registered once at startup, keyed by MAC address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub name: String,
    pub mac_address: String,
    pub ipv4: String,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub kernel_version: String,
    pub host_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainError {
    pub domain: String,
    pub message: String,
}

/// Result of collecting every domain at once. Not persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerOverview>,
    pub errors: Vec<DomainError>,
}
