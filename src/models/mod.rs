// Snapshot value types

mod container;
mod network;
mod snapshot;
mod storage;
mod system;

pub use container::{
    ContainerSnapshot, ContainerState, DockerMetric, DockerOverview, DockerPort, DockerStack,
    ResourceStats,
};
pub use network::{InterfaceStat, NetworkMetric};
pub use snapshot::{MetricKind, MetricSnapshot, unix_millis};
pub use storage::{CapacitySource, DiskMetric, IoCounterStat, PartitionStat, UsageStat};
pub use system::{CpuMetric, DomainError, HostInfo, MemoryMetric, SystemSnapshot};
