// Per-domain collectors

mod cpu;
mod disk;
mod docker;
mod host;
mod memory;
mod network;
pub mod stacks;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use docker::DockerCollector;
pub use host::{HostCollector, outbound_ipv4};
pub use memory::MemoryCollector;
pub use network::NetworkCollector;

use crate::models::MetricSnapshot;
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Produces one snapshot of a domain per call.
#[async_trait]
pub trait Collector: Send + Sync {
    type Snapshot: MetricSnapshot;

    async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<Self::Snapshot>;
}

/// Runs `work` unless `cancel` fires first. A token that is already cancelled wins.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    domain: &str,
    work: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => anyhow::bail!("{} collection cancelled", domain),
        r = work => r,
    }
}
