// Domain services: collect, persist and read back snapshots per domain.

use crate::collectors::stacks::{StackRules, group_into_stacks};
use crate::collectors::{
    Collector, CpuCollector, DiskCollector, DockerCollector, MemoryCollector, NetworkCollector,
};
use crate::config::AppConfig;
use crate::docker_repo::ContainerRuntime;
use crate::history_repo::{HostRegistry, SnapshotRecord, SnapshotStore};
use crate::models::{
    DockerMetric, DockerOverview, DomainError, MetricKind, MetricSnapshot, SystemSnapshot,
    unix_millis,
};
use crate::platform::PlatformStats;
use crate::rates::{CpuRateCalculator, NetworkRateCalculator};
use crate::scheduler::MetricsModule;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub struct MetricService<C: Collector> {
    collector: C,
    store: Arc<dyn SnapshotStore>,
    host_id: i64,
}

impl<C: Collector> MetricService<C> {
    pub fn new(collector: C, store: Arc<dyn SnapshotStore>, host_id: i64) -> Self {
        Self {
            collector,
            store,
            host_id,
        }
    }

    pub fn kind(&self) -> MetricKind {
        C::Snapshot::KIND
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    pub async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<C::Snapshot> {
        self.collector.collect(cancel).await
    }

    pub async fn save(&self, snapshot: &C::Snapshot) -> anyhow::Result<()> {
        let record = SnapshotRecord {
            kind: C::Snapshot::KIND,
            host_id: self.host_id,
            timestamp: snapshot.timestamp(),
            payload: snapshot.encode()?,
        };
        self.store.save(&record).await
    }

    pub async fn get_latest(&self) -> anyhow::Result<Option<C::Snapshot>> {
        match self
            .store
            .latest(C::Snapshot::KIND, Some(self.host_id))
            .await?
        {
            Some(record) => Ok(Some(C::Snapshot::decode(&record.payload)?)),
            None => Ok(None),
        }
    }

    /// Snapshots from the last `hours` hours, oldest first. Undecodable rows are skipped.
    pub async fn get_historical(&self, hours: f64) -> anyhow::Result<Vec<C::Snapshot>> {
        anyhow::ensure!(
            hours.is_finite() && hours > 0.0,
            "hours must be a positive number, got {}",
            hours
        );
        let to = unix_millis();
        let from = to.saturating_sub((hours * 3_600_000.0) as u64);
        let records = self
            .store
            .range(C::Snapshot::KIND, from, to, Some(self.host_id))
            .await?;
        Ok(records
            .iter()
            .filter_map(|r| match C::Snapshot::decode(&r.payload) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::debug!(error = %e, kind = C::Snapshot::KIND.as_str(), timestamp = r.timestamp, "skipping undecodable snapshot");
                    None
                }
            })
            .collect())
    }

    #[instrument(skip_all, fields(service = C::Snapshot::KIND.as_str()))]
    pub async fn collect_and_save(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let snapshot = self.collect(cancel).await?;
        self.save(&snapshot).await
    }
}

#[async_trait]
impl<C: Collector + 'static> MetricsModule for MetricService<C> {
    fn name(&self) -> &'static str {
        C::Snapshot::KIND.as_str()
    }

    async fn collect_and_save(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        MetricService::collect_and_save(self, cancel).await
    }
}

/// Refreshes the registered host's `last_seen` once per cycle.
pub struct HostHeartbeat {
    hosts: Arc<dyn HostRegistry>,
    host_id: i64,
}

impl HostHeartbeat {
    pub fn new(hosts: Arc<dyn HostRegistry>, host_id: i64) -> Self {
        Self { hosts, host_id }
    }
}

#[async_trait]
impl MetricsModule for HostHeartbeat {
    fn name(&self) -> &'static str {
        "host"
    }

    #[instrument(skip_all, fields(service = "host", host_id = self.host_id))]
    async fn collect_and_save(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        if cancel.is_cancelled() {
            anyhow::bail!("host heartbeat cancelled");
        }
        self.hosts.touch_host(self.host_id, unix_millis()).await
    }
}

/// Collaborators shared by every domain service.
pub struct ServiceDeps {
    pub platform: Arc<dyn PlatformStats>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub store: Arc<dyn SnapshotStore>,
    pub host_id: i64,
}

/// The five domain services plus the state they share across cycles.
pub struct MetricServices {
    pub cpu: Arc<MetricService<CpuCollector>>,
    pub memory: Arc<MetricService<MemoryCollector>>,
    pub disk: Arc<MetricService<DiskCollector>>,
    pub network: Arc<MetricService<NetworkCollector>>,
    pub docker: Arc<MetricService<DockerCollector>>,
    stack_rules: StackRules,
}

impl MetricServices {
    pub fn new(deps: ServiceDeps, config: &AppConfig) -> Self {
        let ServiceDeps {
            platform,
            runtime,
            store,
            host_id,
        } = deps;
        let network_rates = Arc::new(NetworkRateCalculator::new(Duration::from_secs(
            config.monitoring.network_stale_after_secs,
        )));
        let cpu_rates = Arc::new(CpuRateCalculator::new());
        let docker = DockerCollector::new(
            runtime,
            cpu_rates,
            Duration::from_secs(config.monitoring.docker_check_interval_secs),
        );
        Self::from_collectors(
            CpuCollector::new(platform.clone()),
            MemoryCollector::new(platform.clone()),
            DiskCollector::new(platform.clone()),
            NetworkCollector::new(platform, network_rates),
            docker,
            store,
            host_id,
            StackRules::from_config(&config.docker),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_collectors(
        cpu: CpuCollector,
        memory: MemoryCollector,
        disk: DiskCollector,
        network: NetworkCollector,
        docker: DockerCollector,
        store: Arc<dyn SnapshotStore>,
        host_id: i64,
        stack_rules: StackRules,
    ) -> Self {
        Self {
            cpu: Arc::new(MetricService::new(cpu, store.clone(), host_id)),
            memory: Arc::new(MetricService::new(memory, store.clone(), host_id)),
            disk: Arc::new(MetricService::new(disk, store.clone(), host_id)),
            network: Arc::new(MetricService::new(network, store.clone(), host_id)),
            docker: Arc::new(MetricService::new(docker, store, host_id)),
            stack_rules,
        }
    }

    /// Modules for the scheduler, in a fixed order.
    pub fn modules(&self) -> Vec<Arc<dyn MetricsModule>> {
        vec![
            self.cpu.clone(),
            self.memory.clone(),
            self.disk.clone(),
            self.network.clone(),
            self.docker.clone(),
        ]
    }

    pub fn docker_overview(&self, metric: DockerMetric) -> DockerOverview {
        DockerOverview {
            timestamp: metric.timestamp,
            stacks: group_into_stacks(&metric.containers, &self.stack_rules),
            total_containers: metric.total_containers,
            running_containers: metric.running_containers,
            docker_available: metric.docker_available,
            error: (!metric.error.is_empty()).then_some(metric.error),
        }
    }

    /// Collects every domain concurrently without persisting. A failed domain is
    /// left out and recorded in `errors`.
    #[instrument(skip_all, fields(operation = "collect_all_current"))]
    pub async fn collect_all_current(&self, cancel: &CancellationToken) -> SystemSnapshot {
        let (cpu, memory, disk, network, docker) = tokio::join!(
            self.cpu.collect(cancel),
            self.memory.collect(cancel),
            self.disk.collect(cancel),
            self.network.collect(cancel),
            self.docker.collect(cancel),
        );

        let mut errors = Vec::new();
        let mut keep = |kind: MetricKind, e: anyhow::Error| {
            tracing::warn!(error = %e, domain = %kind, "collection failed");
            errors.push(DomainError {
                domain: kind.to_string(),
                message: e.to_string(),
            });
        };
        let cpu = cpu.map_err(|e| keep(MetricKind::Cpu, e)).ok();
        let memory = memory.map_err(|e| keep(MetricKind::Memory, e)).ok();
        let disk = disk.map_err(|e| keep(MetricKind::Disk, e)).ok();
        let network = network.map_err(|e| keep(MetricKind::Network, e)).ok();
        let docker = docker.map_err(|e| keep(MetricKind::Docker, e)).ok();

        SystemSnapshot {
            timestamp: unix_millis(),
            cpu,
            memory,
            disk,
            network,
            docker: docker.map(|d| self.docker_overview(d)),
            errors,
        }
    }
}
