// Delta-based CPU percentages from cumulative nanosecond counters

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct CpuSample {
    container_nanos: u64,
    system_nanos: u64,
    taken_at: Instant,
}

/// Remembers the previous cumulative CPU sample per container so consecutive
/// observations can be turned into a usage percentage.
///
/// Entries are replaced wholesale, so a poisoned lock still holds a consistent map
/// and is recovered rather than propagated.
#[derive(Debug, Default)]
pub struct CpuRateCalculator {
    samples: RwLock<HashMap<String, CpuSample>>,
}

impl CpuRateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage of total host CPU time consumed by `key` since its previous sample.
    ///
    /// The first observation of a key only seeds the cache and yields 0. A sample whose
    /// timestamp does not advance past the cached one yields 0 and leaves the cache as is.
    /// Otherwise the cache is overwritten and 0 is returned unless both deltas are positive.
    pub fn system_relative_percent(
        &self,
        key: &str,
        container_nanos: u64,
        system_nanos: u64,
        now: Instant,
    ) -> f64 {
        let current = CpuSample {
            container_nanos,
            system_nanos,
            taken_at: now,
        };
        // Read and replace under one guard so concurrent callers never regress the cache.
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        let Some(previous) = samples.get(key).copied() else {
            samples.insert(key.to_string(), current);
            return 0.0;
        };
        if now <= previous.taken_at {
            return 0.0;
        }
        samples.insert(key.to_string(), current);
        drop(samples);

        let container_delta = container_nanos as i128 - previous.container_nanos as i128;
        let system_delta = system_nanos as i128 - previous.system_nanos as i128;
        if container_delta > 0 && system_delta > 0 {
            container_delta as f64 / system_delta as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Drops cached samples for keys not in `live`.
    pub fn retain_keys(&self, live: &HashSet<String>) {
        self.samples
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|k, _| live.contains(k));
    }

    pub fn len(&self) -> usize {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Usage relative to a CPU limit, from the two samples carried by a single stats reading.
///
/// `previous_nanos` of `None` (or 0) means the runtime had no earlier sample. A limit of
/// 0 or less means unconstrained, in which case the host core count is the denominator.
pub fn limit_relative_percent(
    current_nanos: u64,
    previous_nanos: Option<u64>,
    sample_interval: Duration,
    limit_cores: f64,
    host_cores: usize,
) -> f64 {
    let Some(previous_nanos) = previous_nanos.filter(|p| *p > 0) else {
        return 0.0;
    };
    if sample_interval.is_zero() {
        return 0.0;
    }
    let delta = current_nanos as i128 - previous_nanos as i128;
    if delta <= 0 {
        return 0.0;
    }
    let cores = if limit_cores > 0.0 {
        limit_cores
    } else {
        host_cores as f64
    };
    if cores <= 0.0 {
        return 0.0;
    }
    let capacity_nanos = sample_interval.as_nanos() as f64 * cores;
    delta as f64 / capacity_nanos * 100.0
}
