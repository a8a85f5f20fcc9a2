// Container inventory and per-container resource stats

use super::{Collector, until_cancelled};
use crate::docker_repo::{ContainerRuntime, RuntimeContainer, resource_stats};
use crate::models::{ContainerSnapshot, ContainerState, DockerMetric, ResourceStats, unix_millis};
use crate::rates::CpuRateCalculator;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const SHORT_ID_LEN: usize = 12;

pub struct DockerCollector {
    runtime: Arc<dyn ContainerRuntime>,
    cpu_rates: Arc<CpuRateCalculator>,
    host_cores: usize,
    availability_ttl: Duration,
    availability: Mutex<Option<(Instant, bool)>>,
}

impl DockerCollector {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        cpu_rates: Arc<CpuRateCalculator>,
        availability_ttl: Duration,
    ) -> Self {
        let host_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            runtime,
            cpu_rates,
            host_cores,
            availability_ttl,
            availability: Mutex::new(None),
        }
    }

    /// Overrides the host core count used for unconstrained containers.
    pub fn with_host_cores(mut self, host_cores: usize) -> Self {
        self.host_cores = host_cores;
        self
    }

    /// Whether the runtime answered a ping within the availability window.
    pub async fn is_available(&self) -> bool {
        let mut cached = self.availability.lock().await;
        if let Some((checked_at, available)) = *cached
            && checked_at.elapsed() < self.availability_ttl
        {
            return available;
        }
        let available = match self.runtime.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "docker ping failed");
                false
            }
        };
        *cached = Some((Instant::now(), available));
        available
    }
}

#[async_trait]
impl Collector for DockerCollector {
    type Snapshot = DockerMetric;

    #[instrument(skip_all, fields(collector = "docker"))]
    async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<DockerMetric> {
        let timestamp = unix_millis();
        let available =
            until_cancelled(cancel, "docker", async { Ok(self.is_available().await) }).await?;
        if !available {
            tracing::warn!(operation = "docker_ping", "docker unavailable, reporting no containers");
            return Ok(DockerMetric {
                timestamp,
                containers: Vec::new(),
                total_containers: 0,
                running_containers: 0,
                docker_available: false,
                error: "docker runtime not reachable".into(),
            });
        }

        let listed = until_cancelled(cancel, "docker", async {
            Ok(self.runtime.list_containers(true).await)
        })
        .await?;
        let listed = match listed {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, operation = "list_containers", "container list failed");
                return Ok(DockerMetric {
                    timestamp,
                    containers: Vec::new(),
                    total_containers: 0,
                    running_containers: 0,
                    docker_available: true,
                    error: format!("list containers: {}", e),
                });
            }
        };

        // Every listed container keeps its CPU sample, even when this cycle could not read it.
        let live: HashSet<String> = listed.iter().map(|c| short_id(&c.id)).collect();

        let mut tasks = JoinSet::new();
        for container in listed {
            let runtime = self.runtime.clone();
            let cpu_rates = self.cpu_rates.clone();
            let host_cores = self.host_cores;
            tasks.spawn(async move {
                snapshot_container(runtime.as_ref(), &cpu_rates, host_cores, container).await
            });
        }

        let mut containers = Vec::with_capacity(tasks.len());
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    anyhow::bail!("docker collection cancelled");
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok(Ok(c)) => containers.push(c),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "skipping container");
                }
                Err(e) if e.is_panic() => {
                    tracing::warn!(error = %e, "container task panicked, skipping");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "container task aborted");
                }
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        self.cpu_rates.retain_keys(&live);

        let running = containers.iter().filter(|c| c.is_running()).count();
        Ok(DockerMetric {
            timestamp,
            total_containers: containers.len() as u32,
            running_containers: running as u32,
            containers,
            docker_available: true,
            error: String::new(),
        })
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn display_name(c: &RuntimeContainer) -> String {
    c.names
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| short_id(&c.id))
}

async fn snapshot_container(
    runtime: &dyn ContainerRuntime,
    cpu_rates: &CpuRateCalculator,
    host_cores: usize,
    container: RuntimeContainer,
) -> anyhow::Result<ContainerSnapshot> {
    let id = short_id(&container.id);
    let name = display_name(&container);
    let details = runtime
        .inspect_container(&container.id)
        .await
        .map_err(|e| anyhow::anyhow!("inspect {}: {}", name, e))?;
    let state = ContainerState::from_docker(&container.state);
    let cpu_limit = details.cpu_limit();

    let stats = if state == ContainerState::Running {
        match runtime.container_stats(&container.id).await {
            Ok(s) => resource_stats(&s, &id, cpu_limit, host_cores, cpu_rates, Instant::now()),
            Err(e) => {
                tracing::debug!(error = %e, container = %name, "stats unavailable");
                ResourceStats {
                    cpu_limit,
                    ..Default::default()
                }
            }
        }
    } else {
        ResourceStats {
            cpu_limit,
            ..Default::default()
        }
    };

    Ok(ContainerSnapshot {
        id,
        name,
        image: container.image,
        state,
        status: container.status,
        ports: container.ports,
        stats,
        created: details.created,
        finished_at: details.finished_at,
    })
}
