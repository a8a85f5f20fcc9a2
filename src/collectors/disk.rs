// Disk capacity, per-mount usage and IO counters

use super::{Collector, until_cancelled};
use crate::models::{CapacitySource, DiskMetric, UsageStat, unix_millis};
use crate::platform::PlatformStats;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const ROOT_PATH: &str = "/";

const VIRTUAL_FILESYSTEMS: &[&str] = &[
    "tmpfs",
    "devtmpfs",
    "devfs",
    "overlay",
    "squashfs",
    "proc",
    "sysfs",
    "cgroup",
    "cgroup2",
    "autofs",
    "ramfs",
    "nsfs",
    "tracefs",
    "debugfs",
    "securityfs",
    "pstore",
    "bpf",
    "configfs",
    "mqueue",
    "hugetlbfs",
    "efivarfs",
    "binfmt_misc",
    "fusectl",
];

const NETWORK_FILESYSTEMS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smbfs", "smb3", "sshfs", "ceph", "glusterfs", "9p", "afs",
];

pub struct DiskCollector {
    platform: Arc<dyn PlatformStats>,
}

impl DiskCollector {
    pub fn new(platform: Arc<dyn PlatformStats>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Collector for DiskCollector {
    type Snapshot = DiskMetric;

    #[instrument(skip_all, fields(collector = "disk"))]
    async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<DiskMetric> {
        until_cancelled(cancel, "disk", self.read_disks(cancel)).await
    }
}

impl DiskCollector {
    async fn read_disks(&self, cancel: &CancellationToken) -> anyhow::Result<DiskMetric> {
        let partitions = self.platform.disk_partitions().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "disk_partitions", "partitions unavailable");
            Vec::new()
        });

        let mut paths: Vec<String> = partitions.iter().map(|p| p.mountpoint.clone()).collect();
        let root_listed = paths.iter().any(|p| p == ROOT_PATH);
        if !root_listed {
            paths.push(ROOT_PATH.to_string());
        }
        if cancel.is_cancelled() {
            anyhow::bail!("disk collection cancelled");
        }
        let usages = self.platform.disk_usages(&paths).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "disk_usages", "mount usage unavailable");
            Vec::new()
        });

        let root = usages.iter().find(|u| u.path == ROOT_PATH).cloned();
        if root.is_none() {
            tracing::debug!("root filesystem usage unavailable");
        }
        let mounts: Vec<UsageStat> = usages
            .into_iter()
            .filter(|u| root_listed || u.path != ROOT_PATH)
            .collect();
        let (source, totals) = capacity(root.as_ref(), &mounts);

        if cancel.is_cancelled() {
            anyhow::bail!("disk collection cancelled");
        }
        let io_counters = self.platform.disk_io_counters().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "disk_io_counters", "IO counters unavailable");
            Vec::new()
        });

        Ok(DiskMetric {
            timestamp: unix_millis(),
            total: totals.total,
            used: totals.used,
            free: totals.free,
            usage_percent: totals.percent(),
            capacity_source: source,
            partitions,
            mounts,
            io_counters,
        })
    }
}

#[derive(Debug, Default, PartialEq)]
struct Totals {
    total: u64,
    used: u64,
    free: u64,
}

impl Totals {
    fn of(u: &UsageStat) -> Self {
        Self {
            total: u.total,
            used: u.used,
            free: u.free,
        }
    }

    fn percent(&self) -> f64 {
        if self.total > 0 {
            self.used as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }
}

fn is_physical(fstype: &str) -> bool {
    let fstype = fstype.to_lowercase();
    !fstype.is_empty()
        && !fstype.starts_with("fuse.")
        && !VIRTUAL_FILESYSTEMS.contains(&fstype.as_str())
        && !NETWORK_FILESYSTEMS.contains(&fstype.as_str())
}

/// Root filesystem first, else the largest physical mount, else the sum of every mount.
fn capacity(root: Option<&UsageStat>, mounts: &[UsageStat]) -> (CapacitySource, Totals) {
    if let Some(root) = root.filter(|r| r.total > 0) {
        return (CapacitySource::Root, Totals::of(root));
    }
    if let Some(largest) = mounts
        .iter()
        .filter(|m| is_physical(&m.fstype))
        .max_by_key(|m| m.total)
    {
        return (CapacitySource::LargestPhysical, Totals::of(largest));
    }
    if mounts.is_empty() {
        return (CapacitySource::Unavailable, Totals::default());
    }
    let sum = mounts.iter().fold(Totals::default(), |acc, m| Totals {
        total: acc.total + m.total,
        used: acc.used + m.used,
        free: acc.free + m.free,
    });
    (CapacitySource::SumOfMounts, sum)
}
