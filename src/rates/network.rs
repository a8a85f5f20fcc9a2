// Batched network throughput from cumulative interface counters

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Counters older than this relative to the last committed batch are not used for rates.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkSpeed {
    pub kbps_sent: f64,
    pub kbps_recv: f64,
    pub mbps: f64,
    pub throughput_bytes_per_sec: f64,
    pub packets_sent_per_sec: f64,
    pub packets_recv_per_sec: f64,
}

/// Cumulative counters of one interface at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Default)]
struct BatchState {
    last_batch: Option<Instant>,
    interfaces: HashMap<String, InterfaceCounters>,
}

/// Per-interface rate calculator.
///
/// Rates are computed inside a [`NetworkBatch`]. Every interface of a batch shares the
/// batch timestamp, so all of them divide by the same elapsed time no matter how long
/// the loop over interfaces takes. A batch holds the calculator exclusively until it
/// ends, so concurrent collections never mix their reference times.
#[derive(Debug)]
pub struct NetworkRateCalculator {
    stale_after: Duration,
    state: RwLock<BatchState>,
}

impl Default for NetworkRateCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl NetworkRateCalculator {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            state: RwLock::new(BatchState::default()),
        }
    }

    pub fn begin_batch(&self) -> NetworkBatch<'_> {
        self.begin_batch_at(Instant::now())
    }

    /// Opens a batch stamped with `now`. Blocks while another batch is open.
    pub fn begin_batch_at(&self, now: Instant) -> NetworkBatch<'_> {
        NetworkBatch {
            state: self.state.write().unwrap_or_else(PoisonError::into_inner),
            now,
            stale_after: self.stale_after,
        }
    }

    pub fn last_batch(&self) -> Option<Instant> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_batch
    }
}

/// An open batch. Ending it (or dropping it) commits its timestamp as the reference for
/// the next batch.
pub struct NetworkBatch<'a> {
    state: RwLockWriteGuard<'a, BatchState>,
    now: Instant,
    stale_after: Duration,
}

impl NetworkBatch<'_> {
    /// Rates for `name` since the last committed batch.
    ///
    /// Zero for an interface's first observation, for data older than the stale window,
    /// and when no time has elapsed. Counter resets are treated as no traffic.
    pub fn compute_speed(&mut self, name: &str, current: InterfaceCounters) -> NetworkSpeed {
        let Some(last_batch) = self.state.last_batch else {
            self.state.interfaces.insert(name.to_string(), current);
            return NetworkSpeed::default();
        };
        let since_last = self.now.saturating_duration_since(last_batch);
        if since_last > self.stale_after {
            self.state.interfaces.insert(name.to_string(), current);
            return NetworkSpeed::default();
        }
        let Some(previous) = self.state.interfaces.get(name).copied() else {
            self.state.interfaces.insert(name.to_string(), current);
            return NetworkSpeed::default();
        };
        if since_last.is_zero() {
            return NetworkSpeed::default();
        }
        self.state.interfaces.insert(name.to_string(), current);

        let elapsed = since_last.as_secs_f64();
        let per_sec = |now: u64, before: u64| now.saturating_sub(before) as f64 / elapsed;
        let sent_per_sec = per_sec(current.bytes_sent, previous.bytes_sent);
        let recv_per_sec = per_sec(current.bytes_recv, previous.bytes_recv);
        let throughput = sent_per_sec + recv_per_sec;
        NetworkSpeed {
            kbps_sent: sent_per_sec * 8.0 / 1000.0,
            kbps_recv: recv_per_sec * 8.0 / 1000.0,
            mbps: throughput * 8.0 / 1_000_000.0,
            throughput_bytes_per_sec: throughput,
            packets_sent_per_sec: per_sec(current.packets_sent, previous.packets_sent),
            packets_recv_per_sec: per_sec(current.packets_recv, previous.packets_recv),
        }
    }

    pub fn end(self) {}
}

impl Drop for NetworkBatch<'_> {
    fn drop(&mut self) {
        self.state.last_batch = Some(self.now);
    }
}
