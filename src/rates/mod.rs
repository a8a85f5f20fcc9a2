// Stateful rate calculators shared across collection cycles

mod cpu;
mod network;

pub use cpu::{CpuRateCalculator, limit_relative_percent};
pub use network::{
    DEFAULT_STALE_AFTER, InterfaceCounters, NetworkBatch, NetworkRateCalculator, NetworkSpeed,
};
