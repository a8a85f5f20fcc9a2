// Platform stats via sysinfo

mod linux;

use crate::models::{IoCounterStat, PartitionStat, UsageStat};
use crate::platform::{
    CpuUsage, HostDetails, InterfaceAddresses, LoadAverages, MemoryStats, NetIoCounter,
    PlatformStats, TemperatureSensor,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Components, Disks, Networks, System};
use tracing::instrument;

pub struct SysinfoRepo {
    sys: Arc<std::sync::Mutex<System>>,
    disks: Arc<std::sync::Mutex<Disks>>,
    networks: Arc<std::sync::Mutex<Networks>>,
    components: Arc<std::sync::Mutex<Components>>,
    last_cpu_refresh: Arc<std::sync::Mutex<Option<(Instant, f64)>>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self {
            sys: Arc::new(std::sync::Mutex::new(sys)),
            disks: Arc::new(std::sync::Mutex::new(Disks::new_with_refreshed_list())),
            networks: Arc::new(std::sync::Mutex::new(Networks::new_with_refreshed_list())),
            components: Arc::new(std::sync::Mutex::new(
                Components::new_with_refreshed_list(),
            )),
            last_cpu_refresh: Arc::new(std::sync::Mutex::new(None)),
        }
    }
}

fn usage_of(mount: &str, fstype: &str, total: u64, available: u64) -> UsageStat {
    let used = total.saturating_sub(available);
    let used_percent = if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    UsageStat {
        path: mount.to_string(),
        fstype: fstype.to_string(),
        total,
        free: available,
        used,
        used_percent,
    }
}

#[async_trait]
impl PlatformStats for SysinfoRepo {
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "cpu_usage"))]
    async fn cpu_usage(&self) -> anyhow::Result<CpuUsage> {
        let sys = self.sys.clone();
        let last_cpu_refresh = self.last_cpu_refresh.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;

            let now = Instant::now();
            let usage = match last_cpu_refresh.lock() {
                Ok(mut guard) => match *guard {
                    // Refreshing faster than sysinfo's minimum interval yields noise; reuse the last reading.
                    Some((prev_ts, prev_usage))
                        if now.duration_since(prev_ts) < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL =>
                    {
                        prev_usage
                    }
                    Some(_) => {
                        sys.refresh_cpu_all();
                        let usage = sys.global_cpu_usage() as f64;
                        *guard = Some((now, usage));
                        usage
                    }
                    None => {
                        sys.refresh_cpu_all();
                        *guard = Some((now, 0.0));
                        0.0
                    }
                },
                Err(_) => {
                    sys.refresh_cpu_all();
                    0.0
                }
            };

            let model_name = linux::read_cpu_model_linux()
                .or_else(|| {
                    sys.cpus()
                        .first()
                        .map(|c| c.brand().trim().to_string())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or_else(|| "Unknown".into());

            Ok(CpuUsage {
                usage_percent: usage.clamp(0.0, 100.0),
                logical_cores: sys.cpus().len() as u32,
                model_name,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    async fn load_averages(&self) -> anyhow::Result<LoadAverages> {
        let load = System::load_average();
        Ok(LoadAverages {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "memory"))]
    async fn memory(&self) -> anyhow::Result<MemoryStats> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_memory();

            let total = sys.total_memory();
            let available = sys.available_memory();
            Ok(MemoryStats {
                total,
                available,
                used: total.saturating_sub(available),
                free: sys.free_memory(),
                swap_total: sys.total_swap(),
                swap_used: sys.used_swap(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip_all, fields(repo = "sysinfo", operation = "disk_usages", paths = paths.len()))]
    async fn disk_usages(&self, paths: &[String]) -> anyhow::Result<Vec<UsageStat>> {
        let disks = self.disks.clone();
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut disks = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            disks.refresh(true);
            let mut usages = Vec::with_capacity(paths.len());
            for path in &paths {
                // Longest mount point containing the path wins.
                let Some(disk) = disks
                    .list()
                    .iter()
                    .filter(|d| Path::new(path).starts_with(d.mount_point()))
                    .max_by_key(|d| d.mount_point().as_os_str().len())
                else {
                    tracing::warn!(path = %path, "no filesystem mounted, skipping");
                    continue;
                };
                usages.push(usage_of(
                    path,
                    &disk.file_system().to_string_lossy(),
                    disk.total_space(),
                    disk.available_space(),
                ));
            }
            Ok(usages)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "disk_partitions"))]
    async fn disk_partitions(&self) -> anyhow::Result<Vec<PartitionStat>> {
        let disks = self.disks.clone();
        tokio::task::spawn_blocking(move || {
            let mut disks = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            disks.refresh(true);
            Ok(disks
                .list()
                .iter()
                .map(|d| PartitionStat {
                    device: d.name().to_string_lossy().into_owned(),
                    mountpoint: d.mount_point().to_string_lossy().into_owned(),
                    fstype: d.file_system().to_string_lossy().into_owned(),
                    is_removable: d.is_removable(),
                })
                .collect())
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "disk_io_counters"))]
    async fn disk_io_counters(&self) -> anyhow::Result<Vec<IoCounterStat>> {
        let disks = self.disks.clone();
        tokio::task::spawn_blocking(move || {
            let mut disks = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            disks.refresh(false);
            // A device mounted in several places is reported once.
            let mut seen = HashSet::new();
            Ok(disks
                .list()
                .iter()
                .filter(|d| seen.insert(d.name().to_os_string()))
                .map(|d| {
                    let usage = d.usage();
                    IoCounterStat {
                        name: d.name().to_string_lossy().into_owned(),
                        read_bytes: usage.total_read_bytes,
                        write_bytes: usage.total_written_bytes,
                    }
                })
                .collect())
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "network_io_counters"))]
    async fn network_io_counters(&self) -> anyhow::Result<Vec<NetIoCounter>> {
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut networks = networks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
            networks.refresh(true);
            let mut counters: Vec<NetIoCounter> = networks
                .list()
                .iter()
                .map(|(name, data)| NetIoCounter {
                    name: name.clone(),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_recv: data.total_packets_received(),
                })
                .collect();
            counters.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(counters)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "interface_addresses"))]
    async fn interface_addresses(&self) -> anyhow::Result<Vec<InterfaceAddresses>> {
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut networks = networks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
            networks.refresh(true);
            let mut interfaces: Vec<InterfaceAddresses> = networks
                .list()
                .iter()
                .map(|(name, data)| InterfaceAddresses {
                    name: name.clone(),
                    mac_address: data.mac_address().to_string(),
                    addrs: data.ip_networks().iter().map(|n| n.addr).collect(),
                })
                .collect();
            interfaces.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(interfaces)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "temperature_sensors"))]
    async fn temperature_sensors(&self) -> anyhow::Result<Vec<TemperatureSensor>> {
        let components = self.components.clone();
        tokio::task::spawn_blocking(move || {
            let mut components = components
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo components lock poisoned: {}", e))?;
            components.refresh(true);
            Ok(components
                .list()
                .iter()
                .filter_map(|c| {
                    c.temperature().map(|t| TemperatureSensor {
                        key: c.label().to_string(),
                        temperature: t as f64,
                    })
                })
                .collect())
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "host_details"))]
    async fn host_details(&self) -> anyhow::Result<HostDetails> {
        tokio::task::spawn_blocking(move || {
            let hostname = System::host_name()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| anyhow::anyhow!("hostname unavailable"))?;
            Ok(HostDetails {
                hostname,
                os: std::env::consts::OS.to_string(),
                platform: System::distribution_id(),
                platform_family: linux::read_os_release_field("ID_LIKE").unwrap_or_default(),
                platform_version: System::os_version().unwrap_or_default(),
                kernel_version: System::kernel_version().unwrap_or_default(),
                host_id: linux::read_machine_id().unwrap_or_default(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}
