// Shared test helpers: in-memory fakes for the platform, the container runtime and the store
#![allow(dead_code)]

use async_trait::async_trait;
use bollard::models::{ContainerMemoryStats, ContainerStatsResponse};
use hoststats::collectors::stacks::StackRules;
use hoststats::collectors::{
    CpuCollector, DiskCollector, DockerCollector, MemoryCollector, NetworkCollector,
};
use hoststats::config::AppConfig;
use hoststats::docker_repo::{ContainerDetails, ContainerRuntime, RuntimeContainer, RuntimeError};
use hoststats::history_repo::{HostRecord, HostRegistry, SnapshotRecord, SnapshotStore};
use hoststats::models::*;
use hoststats::platform::*;
use hoststats::rates::{CpuRateCalculator, NetworkRateCalculator};
use hoststats::scheduler::MetricsModule;
use hoststats::service::MetricServices;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[database]
path = "data/test.db"
max_pool_size = 2
"#;

pub fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub fn usage(path: &str, fstype: &str, total: u64, used: u64) -> UsageStat {
    UsageStat {
        path: path.into(),
        fstype: fstype.into(),
        total,
        free: total - used,
        used,
        used_percent: if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        },
    }
}

pub fn partition(device: &str, mountpoint: &str, fstype: &str) -> PartitionStat {
    PartitionStat {
        device: device.into(),
        mountpoint: mountpoint.into(),
        fstype: fstype.into(),
        is_removable: false,
    }
}

pub fn counter(name: &str, bytes_sent: u64, bytes_recv: u64) -> NetIoCounter {
    NetIoCounter {
        name: name.into(),
        bytes_sent,
        bytes_recv,
        ..Default::default()
    }
}

pub fn iface(name: &str, mac: &str, addrs: &[&str]) -> InterfaceAddresses {
    InterfaceAddresses {
        name: name.into(),
        mac_address: mac.into(),
        addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
    }
}

/// Platform readings held in memory. `counters` can be changed between collections.
#[derive(Default)]
pub struct FakePlatform {
    pub counters: Mutex<Vec<NetIoCounter>>,
    pub interfaces: Vec<InterfaceAddresses>,
    pub partitions: Vec<PartitionStat>,
    /// Usage by mount path; a missing path is an error.
    pub usages: HashMap<String, UsageStat>,
    pub sensors: Vec<TemperatureSensor>,
    pub fail_memory: bool,
    /// Every counter read adds the same traffic to each interface.
    pub grow_counters: bool,
    pub disk_usage_calls: AtomicUsize,
}

impl FakePlatform {
    /// A small Linux host with one physical root disk and one ethernet interface.
    pub fn linux_host() -> Self {
        Self {
            counters: Mutex::new(vec![counter("lo", 500, 500), counter("eth0", 1_000, 2_000)]),
            interfaces: vec![
                iface("lo", "00:00:00:00:00:00", &["127.0.0.1"]),
                iface("eth0", "AA:BB:CC:DD:EE:01", &["192.168.1.10"]),
            ],
            partitions: vec![partition("/dev/sda1", "/", "ext4")],
            usages: HashMap::from([("/".to_string(), usage("/", "ext4", 1_000, 250))]),
            sensors: vec![TemperatureSensor {
                key: "coretemp_package_id_0".into(),
                temperature: 48.0,
            }],
            ..Default::default()
        }
    }

    pub fn set_counters(&self, counters: Vec<NetIoCounter>) {
        *self.counters.lock().unwrap() = counters;
    }
}

#[async_trait]
impl PlatformStats for FakePlatform {
    async fn cpu_usage(&self) -> anyhow::Result<CpuUsage> {
        Ok(CpuUsage {
            usage_percent: 12.5,
            logical_cores: 4,
            model_name: "Fake CPU".into(),
        })
    }

    async fn load_averages(&self) -> anyhow::Result<LoadAverages> {
        Ok(LoadAverages {
            one: 0.5,
            five: 0.25,
            fifteen: 0.125,
        })
    }

    async fn memory(&self) -> anyhow::Result<MemoryStats> {
        anyhow::ensure!(!self.fail_memory, "memory unavailable");
        Ok(MemoryStats {
            total: 8_000,
            available: 6_000,
            used: 2_000,
            free: 5_000,
            swap_total: 1_000,
            swap_used: 100,
        })
    }

    async fn disk_usages(&self, paths: &[String]) -> anyhow::Result<Vec<UsageStat>> {
        self.disk_usage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(paths
            .iter()
            .filter_map(|p| self.usages.get(p).cloned())
            .collect())
    }

    async fn disk_partitions(&self) -> anyhow::Result<Vec<PartitionStat>> {
        Ok(self.partitions.clone())
    }

    async fn disk_io_counters(&self) -> anyhow::Result<Vec<IoCounterStat>> {
        Ok(vec![IoCounterStat {
            name: "sda".into(),
            read_bytes: 4096,
            write_bytes: 8192,
        }])
    }

    async fn network_io_counters(&self) -> anyhow::Result<Vec<NetIoCounter>> {
        let mut counters = self.counters.lock().unwrap();
        if self.grow_counters {
            for c in counters.iter_mut() {
                c.bytes_sent += 1_000;
                c.bytes_recv += 1_000;
                c.packets_sent += 10;
                c.packets_recv += 10;
            }
        }
        Ok(counters.clone())
    }

    async fn interface_addresses(&self) -> anyhow::Result<Vec<InterfaceAddresses>> {
        Ok(self.interfaces.clone())
    }

    async fn temperature_sensors(&self) -> anyhow::Result<Vec<TemperatureSensor>> {
        Ok(self.sensors.clone())
    }

    async fn host_details(&self) -> anyhow::Result<HostDetails> {
        Ok(HostDetails {
            hostname: "testhost".into(),
            os: "linux".into(),
            platform: "debian".into(),
            platform_family: "debian".into(),
            platform_version: "12".into(),
            kernel_version: "6.1.0".into(),
            host_id: "0123abcd".into(),
        })
    }
}

pub fn runtime_container(id: &str, name: &str, state: &str) -> RuntimeContainer {
    RuntimeContainer {
        id: id.into(),
        names: vec![format!("/{}", name)],
        image: format!("{}:latest", name),
        state: state.into(),
        status: if state == "running" {
            "Up 5 minutes".into()
        } else {
            "Exited (0) 1 hour ago".into()
        },
        ports: vec![],
    }
}

/// Container runtime held in memory, with injectable failures.
#[derive(Default)]
pub struct FakeRuntime {
    pub unavailable: AtomicBool,
    pub pings: AtomicUsize,
    pub fail_list: bool,
    pub containers: Vec<RuntimeContainer>,
    /// Container ids whose inspect returns an error.
    pub fail_inspect: HashSet<String>,
    /// Container ids whose inspect panics.
    pub panic_inspect: HashSet<String>,
    /// NanoCPUs by container id.
    pub nano_cpus: HashMap<String, i64>,
}

impl FakeRuntime {
    pub fn with_containers(containers: Vec<RuntimeContainer>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Other("connection refused".into()));
        }
        Ok(())
    }

    async fn list_containers(&self, _all: bool) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        if self.fail_list {
            return Err(RuntimeError::Other("list timed out".into()));
        }
        Ok(self.containers.clone())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        if self.panic_inspect.contains(id) {
            panic!("inspect of {} exploded", id);
        }
        if self.fail_inspect.contains(id) {
            return Err(RuntimeError::Other(format!("no such container: {}", id)));
        }
        Ok(ContainerDetails {
            nano_cpus: self.nano_cpus.get(id).copied().unwrap_or(0),
            created: "2024-01-01T00:00:00Z".into(),
            ..Default::default()
        })
    }

    async fn container_stats(&self, _id: &str) -> Result<ContainerStatsResponse, RuntimeError> {
        Ok(ContainerStatsResponse {
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(100),
                limit: Some(1_000),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

/// Snapshot store and host registry held in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<SnapshotRecord>>,
    pub hosts: Mutex<Vec<HostRecord>>,
}

impl MemoryStore {
    pub fn count(&self, kind: MetricKind) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, record: &SnapshotRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn latest(
        &self,
        kind: MetricKind,
        host_id: Option<i64>,
    ) -> anyhow::Result<Option<SnapshotRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind && host_id.is_none_or(|h| r.host_id == h))
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn range(
        &self,
        kind: MetricKind,
        from_ms: u64,
        to_ms: u64,
        host_id: Option<i64>,
    ) -> anyhow::Result<Vec<SnapshotRecord>> {
        let mut out: Vec<SnapshotRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.kind == kind
                    && r.timestamp >= from_ms
                    && r.timestamp <= to_ms
                    && host_id.is_none_or(|h| r.host_id == h)
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }
}

#[async_trait]
impl HostRegistry for MemoryStore {
    async fn upsert_host(&self, info: &HostInfo) -> anyhow::Result<i64> {
        anyhow::ensure!(!info.mac_address.is_empty(), "host MAC address is empty");
        let mut hosts = self.hosts.lock().unwrap();
        let now = unix_millis();
        if let Some(h) = hosts.iter_mut().find(|h| h.info.mac_address == info.mac_address) {
            h.info = info.clone();
            h.last_seen = now;
            return Ok(h.id);
        }
        let id = hosts.len() as i64 + 1;
        hosts.push(HostRecord {
            id,
            info: info.clone(),
            last_seen: now,
        });
        Ok(id)
    }

    async fn touch_host(&self, id: i64, seen_at: u64) -> anyhow::Result<()> {
        let mut hosts = self.hosts.lock().unwrap();
        let host = hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| anyhow::anyhow!("host {} is not registered", id))?;
        host.last_seen = seen_at;
        Ok(())
    }

    async fn get_host(&self, id: i64) -> anyhow::Result<Option<HostRecord>> {
        Ok(self.hosts.lock().unwrap().iter().find(|h| h.id == id).cloned())
    }

    async fn list_hosts(&self) -> anyhow::Result<Vec<HostRecord>> {
        Ok(self.hosts.lock().unwrap().clone())
    }
}

pub fn no_outbound_route() -> Option<IpAddr> {
    None
}

pub fn eth0_outbound_route() -> Option<IpAddr> {
    Some("192.168.1.10".parse().unwrap())
}

/// Services wired to fakes, with a fixed host core count and no outbound-route lookup.
pub fn fake_services(
    platform: Arc<FakePlatform>,
    runtime: Arc<FakeRuntime>,
    store: Arc<MemoryStore>,
) -> MetricServices {
    let config = test_app_config();
    let docker = DockerCollector::new(
        runtime,
        Arc::new(CpuRateCalculator::new()),
        Duration::from_secs(5),
    )
    .with_host_cores(4);
    MetricServices::from_collectors(
        CpuCollector::new(platform.clone()),
        MemoryCollector::new(platform.clone()),
        DiskCollector::new(platform.clone()),
        NetworkCollector::new(platform, Arc::new(NetworkRateCalculator::default()))
            .with_outbound_lookup(no_outbound_route),
        docker,
        store,
        1,
        StackRules::from_config(&config.docker),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Scheduler module that counts its invocations.
pub struct CountingModule {
    pub name: &'static str,
    pub behavior: Behavior,
    pub calls: AtomicUsize,
}

impl CountingModule {
    pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsModule for CountingModule {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn collect_and_save(&self, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => anyhow::bail!("{} failed", self.name),
            Behavior::Panic => panic!("{} panicked", self.name),
        }
    }
}
