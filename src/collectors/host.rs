// Host identity: hostname, OS and the MAC/IP pair used to register the host

use super::until_cancelled;
use crate::models::HostInfo;
use crate::platform::{InterfaceAddresses, NetIoCounter, PlatformStats};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Any routable address works; UDP connect sends nothing.
const ROUTE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// Local IPv4 address of the outbound default route, if one exists.
pub fn outbound_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_TARGET).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

pub struct HostCollector {
    platform: Arc<dyn PlatformStats>,
    outbound: fn() -> Option<IpAddr>,
}

impl HostCollector {
    pub fn new(platform: Arc<dyn PlatformStats>) -> Self {
        Self {
            platform,
            outbound: outbound_ipv4,
        }
    }

    /// Replaces the outbound-route lookup.
    pub fn with_outbound_lookup(mut self, outbound: fn() -> Option<IpAddr>) -> Self {
        self.outbound = outbound;
        self
    }

    /// Resolves host identity. Fails when no interface has both a MAC and an IPv4 address.
    #[instrument(skip_all, fields(collector = "host"))]
    pub async fn collect(&self, cancel: &CancellationToken) -> anyhow::Result<HostInfo> {
        let (details, interfaces, counters) = until_cancelled(cancel, "host", async {
            let details = self.platform.host_details().await?;
            let interfaces = self.platform.interface_addresses().await?;
            let counters = self.platform.network_io_counters().await.unwrap_or_else(|e| {
                tracing::debug!(error = %e, "network counters unavailable for MAC selection");
                Vec::new()
            });
            Ok((details, interfaces, counters))
        })
        .await?;

        let (mac_address, ipv4) = select_identity(&interfaces, &counters, (self.outbound)())
            .ok_or_else(|| anyhow::anyhow!("no interface with both a MAC address and an IPv4 address"))?;

        Ok(HostInfo {
            name: details.hostname,
            mac_address,
            ipv4: ipv4.to_string(),
            os: details.os,
            platform: details.platform,
            platform_family: details.platform_family,
            platform_version: details.platform_version,
            kernel_version: details.kernel_version,
            host_id: details.host_id,
        })
    }
}

/// Normalized MAC (lowercase colon hex), or None for missing, all-zero or malformed addresses.
fn valid_mac(raw: &str) -> Option<String> {
    let octets: Vec<&str> = raw.split([':', '-']).collect();
    if octets.len() != 6 {
        return None;
    }
    let mut bytes = [0u8; 6];
    for (b, o) in bytes.iter_mut().zip(&octets) {
        *b = u8::from_str_radix(o, 16).ok()?;
    }
    if bytes.iter().all(|b| *b == 0) {
        return None;
    }
    Some(
        bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

fn first_ipv4(iface: &InterfaceAddresses) -> Option<Ipv4Addr> {
    iface.addrs.iter().find_map(|a| match a {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(*v4),
        _ => None,
    })
}

/// MAC/IPv4 pair for the host: the interface owning the outbound IP, else the busiest
/// interface by received bytes, else the first usable interface.
fn select_identity(
    interfaces: &[InterfaceAddresses],
    counters: &[NetIoCounter],
    outbound: Option<IpAddr>,
) -> Option<(String, Ipv4Addr)> {
    let usable: Vec<(&InterfaceAddresses, String, Ipv4Addr)> = interfaces
        .iter()
        .filter_map(|i| Some((i, valid_mac(&i.mac_address)?, first_ipv4(i)?)))
        .collect();

    if let Some(IpAddr::V4(outbound)) = outbound
        && let Some((_, mac, _)) = usable.iter().find(|(i, _, _)| i.addrs.contains(&IpAddr::V4(outbound)))
    {
        return Some((mac.clone(), outbound));
    }

    let received = |name: &str| {
        counters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.bytes_recv)
            .unwrap_or(0)
    };
    if let Some((_, mac, ip)) = usable
        .iter()
        .filter(|(i, _, _)| received(&i.name) > 0)
        .max_by_key(|(i, _, _)| received(&i.name))
    {
        return Some((mac.clone(), *ip));
    }

    usable.first().map(|(_, mac, ip)| (mac.clone(), *ip))
}
