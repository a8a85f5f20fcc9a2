// Metric kinds and the binary encoding shared by persisted snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CpuMetric, DiskMetric, DockerMetric, MemoryMetric, NetworkMetric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
    Docker,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
        MetricKind::Docker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
            MetricKind::Docker => "docker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted, timestamped observation of one domain.
pub trait MetricSnapshot: Serialize + Clone + Send + Sync + 'static {
    const KIND: MetricKind;

    /// Capture time, milliseconds since the Unix epoch.
    fn timestamp(&self) -> u64;

    fn encode(&self) -> anyhow::Result<Vec<u8>>;

    fn decode(bytes: &[u8]) -> anyhow::Result<Self>;
}

macro_rules! wincode_snapshot {
    ($ty:ty, $kind:expr) => {
        impl MetricSnapshot for $ty {
            const KIND: MetricKind = $kind;

            fn timestamp(&self) -> u64 {
                self.timestamp
            }

            fn encode(&self) -> anyhow::Result<Vec<u8>> {
                wincode::serialize(self)
                    .map_err(|e| anyhow::anyhow!("wincode {}: {}", $kind, e))
            }

            fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
                wincode::deserialize::<$ty>(bytes)
                    .map_err(|e| anyhow::anyhow!("wincode deserialize {}: {}", $kind, e))
            }
        }
    };
}

wincode_snapshot!(CpuMetric, MetricKind::Cpu);
wincode_snapshot!(MemoryMetric, MetricKind::Memory);
wincode_snapshot!(DiskMetric, MetricKind::Disk);
wincode_snapshot!(NetworkMetric, MetricKind::Network);
wincode_snapshot!(DockerMetric, MetricKind::Docker);

/// Wall-clock capture time in milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}
