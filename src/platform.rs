// Platform statistics seam. The default implementation is `sysinfo_repo::SysinfoRepo`.

use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;

use crate::models::{IoCounterStat, PartitionStat, UsageStat};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuUsage {
    pub usage_percent: f64,
    pub logical_cores: u32,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadAverages {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// Cumulative counters for one network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetIoCounter {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceAddresses {
    pub name: String,
    /// Colon-separated hex; empty or all-zero when the interface has no hardware address.
    pub mac_address: String,
    pub addrs: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSensor {
    pub key: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostDetails {
    pub hostname: String,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub kernel_version: String,
    pub host_id: String,
}

/// Raw host readings consumed by the domain collectors.
#[async_trait]
pub trait PlatformStats: Send + Sync {
    async fn cpu_usage(&self) -> anyhow::Result<CpuUsage>;

    async fn load_averages(&self) -> anyhow::Result<LoadAverages>;

    async fn memory(&self) -> anyhow::Result<MemoryStats>;

    /// Usage of the filesystem mounted at (or containing) each path, read from a single
    /// refresh. Paths with no backing filesystem are left out.
    async fn disk_usages(&self, paths: &[String]) -> anyhow::Result<Vec<UsageStat>>;

    async fn disk_partitions(&self) -> anyhow::Result<Vec<PartitionStat>>;

    async fn disk_io_counters(&self) -> anyhow::Result<Vec<IoCounterStat>>;

    async fn network_io_counters(&self) -> anyhow::Result<Vec<NetIoCounter>>;

    async fn interface_addresses(&self) -> anyhow::Result<Vec<InterfaceAddresses>>;

    async fn temperature_sensors(&self) -> anyhow::Result<Vec<TemperatureSensor>>;

    async fn host_details(&self) -> anyhow::Result<HostDetails>;
}
