// ── Host-driven traces ──
//
// Builds probe packets from what the control plane knows about two hosts
// and traces them from every location of the source. Hosts on the same
// device and VLAN are bridged; everything else is routed through the
// source device's router MAC.

use std::net::IpAddr;

use ipnetwork::{Ipv4Network, Ipv6Network};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::result::StaticPacketTrace;
use super::trace::Tracer;
use crate::error::CoreError;
use crate::model::{Criterion, Host, HostId, Packet, ether_type};
use crate::providers::NetworkView;

impl<V: NetworkView + ?Sized> Tracer<'_, V> {
    /// Trace from host `src` to host `dst` with the given Ethernet type.
    ///
    /// Unknown hosts are an error. Anything else that prevents building a
    /// probe comes back as a failed trace in the result list.
    pub fn trace_hosts(
        &self,
        src: &HostId,
        dst: &HostId,
        eth_type: u16,
    ) -> Result<Vec<StaticPacketTrace>, CoreError> {
        self.trace_hosts_cancellable(src, dst, eth_type, &CancellationToken::new())
    }

    pub fn trace_hosts_cancellable(
        &self,
        src: &HostId,
        dst: &HostId,
        eth_type: u16,
        cancel: &CancellationToken,
    ) -> Result<Vec<StaticPacketTrace>, CoreError> {
        let source = self
            .view
            .host(src)
            .ok_or(CoreError::HostNotFound { id: *src })?;
        let destination = self
            .view
            .host(dst)
            .ok_or(CoreError::HostNotFound { id: *dst })?;
        info!(%src, %dst, eth_type, "tracing between hosts");

        let base = Packet::new()
            .with_criterion(Criterion::EthType(eth_type))
            .with_criterion(Criterion::EthSrc(source.mac))
            .with_criterion(Criterion::VlanVid(source.vlan));
        let endpoints = |trace: StaticPacketTrace| trace.with_endpoints(*src, *dst);
        let mut traces = Vec::new();

        let bridged = shares_device(&source, &destination) && vlans_match(&source, &destination);
        if bridged {
            let packet = base.with_criterion(Criterion::EthDst(destination.mac));
            for location in &source.locations {
                let trace =
                    self.trace_cancellable(&packet, location, Some(&destination), cancel)?;
                traces.push(endpoints(trace));
            }
            if destination.locations.len() <= 1 {
                return Ok(traces);
            }
        }

        let ipv6 = match eth_type {
            ether_type::IPV4 => false,
            ether_type::IPV6 => true,
            _ => {
                traces.push(endpoints(StaticPacketTrace::failed(
                    "Host based trace supports only IPv4 or IPv6 as EtherType, please use packet based",
                )));
                return Ok(traces);
            }
        };
        let family = if ipv6 { "IPv6" } else { "IPv4" };
        let Some(src_ip) = source.routable_ip(ipv6) else {
            traces.push(endpoints(StaticPacketTrace::failed(format!(
                "Host {src} has no {family} address"
            ))));
            return Ok(traces);
        };
        let Some(dst_ip) = destination.routable_ip(ipv6) else {
            traces.push(endpoints(StaticPacketTrace::failed(format!(
                "Host {dst} has no {family} address"
            ))));
            return Ok(traces);
        };
        let routed = base
            .with_criterion(host_route(src_ip, true)?)
            .with_criterion(host_route(dst_ip, false)?);

        for location in &source.locations {
            let router_mac = self
                .view
                .device(&location.device)
                .and_then(|device| device.router_mac);
            let Some(router_mac) = router_mac else {
                traces.push(endpoints(StaticPacketTrace::failed(format!(
                    "Can't get {} router MAC address, can't perform L3 tracing",
                    location.device
                ))));
                continue;
            };
            let packet = routed.with_criterion(Criterion::EthDst(router_mac));
            let trace = self.trace_cancellable(&packet, location, Some(&destination), cancel)?;
            traces.push(endpoints(trace));
        }
        Ok(traces)
    }

    /// Ordered host pairs a ping-all run traces for `eth_type`, each with
    /// [`Tracer::trace_hosts`].
    ///
    /// Both hosts need an address of the family. Hosts that only have
    /// link-local addresses pair up only when they share a location.
    pub fn ping_pairs(&self, eth_type: u16) -> Vec<(HostId, HostId)> {
        let ipv6 = eth_type == ether_type::IPV6;
        let mut hosts = self.view.hosts();
        hosts.retain(|h| h.has_ip_family(ipv6));
        hosts.sort_by_key(Host::id);

        let mut pairs = Vec::new();
        for src in &hosts {
            for dst in &hosts {
                if src.id() == dst.id() {
                    continue;
                }
                let src_local = src.only_link_local(ipv6);
                let dst_local = dst.only_link_local(ipv6);
                let eligible = match (src_local, dst_local) {
                    (false, false) => true,
                    (true, true) => src.locations.iter().any(|l| dst.locations.contains(l)),
                    _ => false,
                };
                if eligible {
                    pairs.push((src.id(), dst.id()));
                }
            }
        }
        pairs
    }
}

fn shares_device(a: &Host, b: &Host) -> bool {
    a.locations
        .iter()
        .any(|la| b.locations.iter().any(|lb| la.device == lb.device))
}

/// Untagged on either side matches any VLAN.
fn vlans_match(a: &Host, b: &Host) -> bool {
    a.vlan == b.vlan || a.vlan.is_none() || b.vlan.is_none()
}

/// Exact-address IP criterion, source or destination.
fn host_route(ip: IpAddr, source: bool) -> Result<Criterion, CoreError> {
    let invalid = |e: ipnetwork::IpNetworkError| CoreError::Parse {
        kind: "host address",
        input: ip.to_string(),
        reason: e.to_string(),
    };
    Ok(match ip {
        IpAddr::V4(v4) => {
            let net = Ipv4Network::new(v4, 32).map_err(invalid)?;
            if source {
                Criterion::Ipv4Src(net)
            } else {
                Criterion::Ipv4Dst(net)
            }
        }
        IpAddr::V6(v6) => {
            let net = Ipv6Network::new(v6, 128).map_err(invalid)?;
            if source {
                Criterion::Ipv6Src(net)
            } else {
                Criterion::Ipv6Dst(net)
            }
        }
    })
}
