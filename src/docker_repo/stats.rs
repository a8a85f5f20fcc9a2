// Normalize a raw Docker stats reading into ResourceStats.

use crate::models::ResourceStats;
use crate::rates::{CpuRateCalculator, limit_relative_percent};
use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Builds resource stats for the container keyed `key`.
///
/// `cpu_percent` is measured against the previous reading cached in `cpu_rates`;
/// `cpu_percent_of_limit` uses the read/preread pair inside this single reading.
pub fn resource_stats(
    s: &ContainerStatsResponse,
    key: &str,
    cpu_limit: f64,
    host_cores: usize,
    cpu_rates: &CpuRateCalculator,
    now: Instant,
) -> ResourceStats {
    let total_usage = s
        .cpu_stats
        .as_ref()
        .and_then(|c| c.cpu_usage.as_ref())
        .and_then(|u| u.total_usage)
        .unwrap_or(0);
    let system_usage = s
        .cpu_stats
        .as_ref()
        .and_then(|c| c.system_cpu_usage)
        .unwrap_or(0);
    let previous_usage = s
        .precpu_stats
        .as_ref()
        .and_then(|c| c.cpu_usage.as_ref())
        .and_then(|u| u.total_usage);

    let cpu_percent = cpu_rates.system_relative_percent(key, total_usage, system_usage, now);
    let cpu_percent_of_limit = limit_relative_percent(
        total_usage,
        previous_usage,
        sample_interval(s),
        cpu_limit,
        host_cores,
    );

    let memory_usage = s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
    let memory_limit = s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);
    let memory_percent = if memory_limit > 0 {
        memory_usage as f64 / memory_limit as f64 * 100.0
    } else {
        0.0
    };

    let (network_rx, network_tx) = s.networks.as_ref().map_or((0u64, 0u64), |n| {
        n.values().fold((0, 0), |(rx, tx), v| {
            (rx + v.rx_bytes.unwrap_or(0), tx + v.tx_bytes.unwrap_or(0))
        })
    });

    let (block_read, block_write) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0u64, 0u64), |entries| {
            let mut read = 0u64;
            let mut write = 0u64;
            for e in entries {
                match e.op.as_deref() {
                    Some(op) if op.eq_ignore_ascii_case("read") => read += e.value.unwrap_or(0),
                    Some(op) if op.eq_ignore_ascii_case("write") => write += e.value.unwrap_or(0),
                    _ => {}
                }
            }
            (read, write)
        });

    ResourceStats {
        cpu_percent,
        cpu_limit,
        cpu_percent_of_limit,
        memory_usage,
        memory_limit,
        memory_percent,
        network_rx,
        network_tx,
        block_read,
        block_write,
        pids: s.pids_stats.as_ref().and_then(|p| p.current).unwrap_or(0),
    }
}

/// Time between the two CPU samples in one reading; zero when unknown or not increasing.
fn sample_interval(s: &ContainerStatsResponse) -> Duration {
    let read = reading_time(serde_json::to_value(&s.read).ok());
    let preread = reading_time(serde_json::to_value(&s.preread).ok());
    match (read, preread) {
        (Some(read), Some(preread)) => (read - preread).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

fn reading_time(raw: Option<serde_json::Value>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let t = DateTime::parse_from_rfc3339(raw.as_str()?).ok()?;
    // Preread is the zero time when the daemon had no earlier sample.
    (t.timestamp() > 0).then(|| t.with_timezone(&Utc))
}
