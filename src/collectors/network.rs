// Per-interface counters and batched throughput

use super::host::outbound_ipv4;
use super::{Collector, until_cancelled};
use crate::models::{InterfaceStat, NetworkMetric, unix_millis};
use crate::platform::{NetIoCounter, PlatformStats};
use crate::rates::{InterfaceCounters, NetworkRateCalculator};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const LOOPBACK_INTERFACES: &[&str] = &["lo", "lo0"];

pub struct NetworkCollector {
    platform: Arc<dyn PlatformStats>,
    rates: Arc<NetworkRateCalculator>,
    outbound: fn() -> Option<IpAddr>,
}

impl NetworkCollector {
    pub fn new(platform: Arc<dyn PlatformStats>, rates: Arc<NetworkRateCalculator>) -> Self {
        Self {
            platform,
            rates,
            outbound: outbound_ipv4,
        }
    }

    /// Replaces the outbound-route lookup used to mark the primary interface.
    pub fn with_outbound_lookup(mut self, outbound: fn() -> Option<IpAddr>) -> Self {
        self.outbound = outbound;
        self
    }

    async fn primary_interface(&self) -> Option<String> {
        let ip = (self.outbound)()?;
        let interfaces = match self.platform.interface_addresses().await {
            Ok(i) => i,
            Err(e) => {
                tracing::debug!(error = %e, "interface addresses unavailable");
                return None;
            }
        };
        interfaces
            .into_iter()
            .find(|i| i.addrs.contains(&ip))
            .map(|i| i.name)
    }
}

#[async_trait]
impl Collector for NetworkCollector {
    type Snapshot = NetworkMetric;

    #[instrument(skip_all, fields(collector = "network"))]
    async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<NetworkMetric> {
        until_cancelled(cancel, "network", async {
            let counters = self.platform.network_io_counters().await?;
            let primary = self.primary_interface().await;
            Ok(NetworkMetric {
                timestamp: unix_millis(),
                interfaces: rate_batch(&self.rates, counters, primary.as_deref()),
            })
        })
        .await
    }
}

/// Turns one read of counters into interface stats inside a single rate batch.
fn rate_batch(
    rates: &NetworkRateCalculator,
    counters: Vec<NetIoCounter>,
    primary: Option<&str>,
) -> Vec<InterfaceStat> {
    let mut batch = rates.begin_batch();
    let interfaces = counters
        .into_iter()
        .filter(|c| !LOOPBACK_INTERFACES.contains(&c.name.as_str()))
        .map(|c| {
            let speed = batch.compute_speed(
                &c.name,
                InterfaceCounters {
                    bytes_sent: c.bytes_sent,
                    bytes_recv: c.bytes_recv,
                    packets_sent: c.packets_sent,
                    packets_recv: c.packets_recv,
                },
            );
            InterfaceStat {
                is_primary: primary == Some(c.name.as_str()),
                name: c.name,
                bytes_sent: c.bytes_sent,
                bytes_recv: c.bytes_recv,
                packets_sent: c.packets_sent,
                packets_recv: c.packets_recv,
                speed_kbps_sent: speed.kbps_sent,
                speed_kbps_recv: speed.kbps_recv,
                speed_mbps: speed.mbps,
                throughput_bytes_per_sec: speed.throughput_bytes_per_sec,
                packets_sent_per_sec: speed.packets_sent_per_sec,
                packets_recv_per_sec: speed.packets_recv_per_sec,
            }
        })
        .collect();
    batch.end();
    interfaces
}
