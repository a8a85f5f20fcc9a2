// CPU usage, load averages and temperature

use super::{Collector, until_cancelled};
use crate::models::{CpuMetric, unix_millis};
use crate::platform::{PlatformStats, TemperatureSensor};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Sensor labels that usually carry the package/core temperature (Linux hwmon, macOS SMC, Windows ACPI).
const CPU_SENSOR_KEYS: &[&str] = &[
    "coretemp",
    "k10temp",
    "zenpower",
    "cpu_thermal",
    "cpu-thermal",
    "soc_thermal",
    "package id",
    "tctl",
    "tdie",
    "tc0p",
    "tc0d",
    "tc0e",
    "tc0f",
    "tcxc",
    "acpitz",
];

const FUZZY_KEYS: &[&str] = &["thermal", "temp", "cpu", "core"];

/// Battery sensors, used as a proxy on laptops that expose nothing else.
const BATTERY_KEYS: &[&str] = &["tb0t", "tb1t"];

const MAX_PLAUSIBLE_CELSIUS: f64 = 150.0;

pub struct CpuCollector {
    platform: Arc<dyn PlatformStats>,
}

impl CpuCollector {
    pub fn new(platform: Arc<dyn PlatformStats>) -> Self {
        Self { platform }
    }

    /// Every temperature sensor the platform exposes, unfiltered.
    pub async fn sensors(&self) -> anyhow::Result<Vec<TemperatureSensor>> {
        self.platform.temperature_sensors().await
    }
}

#[async_trait]
impl Collector for CpuCollector {
    type Snapshot = CpuMetric;

    #[instrument(skip_all, fields(collector = "cpu"))]
    async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<CpuMetric> {
        until_cancelled(cancel, "cpu", async {
            let usage = self.platform.cpu_usage().await?;
            let load = self.platform.load_averages().await?;
            let temperature = match self.sensors().await {
                Ok(sensors) => cpu_temperature(&sensors),
                Err(e) => {
                    tracing::warn!(error = %e, operation = "temperature_sensors", "temperature unavailable");
                    0.0
                }
            };
            Ok(CpuMetric {
                timestamp: unix_millis(),
                usage_percent: usage.usage_percent,
                cores: usage.logical_cores,
                load_avg_1: load.one,
                load_avg_5: load.five,
                load_avg_15: load.fifteen,
                temperature,
                model_name: usage.model_name,
            })
        })
        .await
    }
}

fn first_matching(sensors: &[TemperatureSensor], keys: &[&str]) -> Option<f64> {
    sensors
        .iter()
        .filter(|s| {
            let label = s.key.to_lowercase();
            keys.iter().any(|k| label.contains(k))
        })
        .map(|s| s.temperature)
        .find(|t| *t > 0.0)
}

/// Best-effort CPU temperature: known sensor names, then fuzzy names, then battery
/// sensors, then the first plausible reading. 0 when nothing is usable.
pub(crate) fn cpu_temperature(sensors: &[TemperatureSensor]) -> f64 {
    first_matching(sensors, CPU_SENSOR_KEYS)
        .or_else(|| first_matching(sensors, FUZZY_KEYS))
        .or_else(|| first_matching(sensors, BATTERY_KEYS))
        .or_else(|| {
            sensors
                .iter()
                .map(|s| s.temperature)
                .find(|t| *t > 0.0 && *t < MAX_PLAUSIBLE_CELSIUS)
        })
        .unwrap_or(0.0)
}
