// Physical memory and swap usage

use super::{Collector, until_cancelled};
use crate::models::{MemoryMetric, unix_millis};
use crate::platform::PlatformStats;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub struct MemoryCollector {
    platform: Arc<dyn PlatformStats>,
}

impl MemoryCollector {
    pub fn new(platform: Arc<dyn PlatformStats>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    type Snapshot = MemoryMetric;

    #[instrument(skip_all, fields(collector = "memory"))]
    async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<MemoryMetric> {
        let m = until_cancelled(cancel, "memory", self.platform.memory()).await?;
        let usage_percent = if m.total > 0 {
            m.used as f64 / m.total as f64 * 100.0
        } else {
            0.0
        };
        Ok(MemoryMetric {
            timestamp: unix_millis(),
            total: m.total,
            available: m.available,
            used: m.used,
            free: m.free,
            usage_percent,
            swap_total: m.swap_total,
            swap_used: m.swap_used,
        })
    }
}
