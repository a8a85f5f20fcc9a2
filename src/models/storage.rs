// Disk partition, usage and IO models

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStat {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub is_removable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct UsageStat {
    pub path: String,
    pub fstype: String,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct IoCounterStat {
    pub name: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Which branch of the capacity fallback produced the disk totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub enum CapacitySource {
    Root,
    LargestPhysical,
    SumOfMounts,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct DiskMetric {
    pub timestamp: u64,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub usage_percent: f64,
    pub capacity_source: CapacitySource,
    pub partitions: Vec<PartitionStat>,
    pub mounts: Vec<UsageStat>,
    pub io_counters: Vec<IoCounterStat>,
}
