// ── Topology types ──
//
// Devices, the directed links between their ports and the end hosts
// attached to edge ports.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::identity::{ConnectPoint, DeviceId, HostId, MacAddress, PortNumber, VlanId};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    #[default]
    Direct,
    Indirect,
    Edge,
    Tunnel,
    Optical,
    Virtual,
}

/// Directed infrastructure link; forwarding follows `src` → `dst`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub src: ConnectPoint,
    pub dst: ConnectPoint,
    #[serde(default, rename = "type")]
    pub link_type: LinkType,
}

impl Link {
    pub fn new(src: ConnectPoint, dst: ConnectPoint) -> Self {
        Self {
            src,
            dst,
            link_type: LinkType::Direct,
        }
    }
}

/// An end station known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub mac: MacAddress,
    #[serde(default = "untagged")]
    pub vlan: VlanId,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    pub locations: Vec<ConnectPoint>,
}

fn untagged() -> VlanId {
    VlanId::NONE
}

impl Host {
    pub fn new(mac: MacAddress, vlan: VlanId, location: ConnectPoint) -> Self {
        Self {
            mac,
            vlan,
            ips: Vec::new(),
            locations: vec![location],
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ips.push(ip);
        self
    }

    pub fn id(&self) -> HostId {
        HostId::new(self.mac, self.vlan)
    }

    /// First address of the requested family that is not link-local.
    pub fn routable_ip(&self, ipv6: bool) -> Option<IpAddr> {
        self.ips
            .iter()
            .copied()
            .find(|ip| ip.is_ipv6() == ipv6 && !is_link_local(*ip))
    }

    pub fn has_ip_family(&self, ipv6: bool) -> bool {
        self.ips.iter().any(|ip| ip.is_ipv6() == ipv6)
    }

    /// Whether the host carries only link-local addresses of that family.
    pub fn only_link_local(&self, ipv6: bool) -> bool {
        self.has_ip_family(ipv6) && self.routable_ip(ipv6).is_none()
    }
}

pub fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => v6.segments()[0] & 0xffc0 == 0xfe80,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortInfo {
    pub number: PortNumber,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

/// A forwarding element and the facts the engine needs about it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Driver identifier, used to pick a pipeline overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default = "enabled")]
    pub available: bool,
    #[serde(default)]
    pub ports: Vec<PortInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_mac: Option<MacAddress>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            driver: None,
            available: true,
            ports: Vec::new(),
            router_mac: None,
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u64>) -> Self {
        self.ports.extend(ports.into_iter().map(|n| PortInfo {
            number: PortNumber::new(n),
            enabled: true,
        }));
        self
    }

    pub fn port(&self, number: PortNumber) -> Option<&PortInfo> {
        self.ports.iter().find(|p| p.number == number)
    }

    pub fn enabled_ports(&self) -> impl Iterator<Item = PortNumber> + '_ {
        self.ports.iter().filter(|p| p.enabled).map(|p| p.number)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn routable_ip_skips_link_local() {
        let host = Host::new(
            "00:00:00:00:00:01".parse().unwrap(),
            VlanId::NONE,
            "s1/1".parse().unwrap(),
        )
        .with_ip("fe80::1".parse().unwrap())
        .with_ip("2001:db8::1".parse().unwrap())
        .with_ip("10.0.0.1".parse().unwrap());
        assert_eq!(host.routable_ip(true), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(host.routable_ip(false), Some("10.0.0.1".parse().unwrap()));
        assert!(!host.only_link_local(true));
    }

    #[test]
    fn device_defaults_from_json() {
        let device: Device =
            serde_json::from_str(r#"{"id":"s1","ports":[{"number":1},{"number":2,"enabled":false}]}"#)
                .unwrap();
        assert!(device.available);
        assert_eq!(device.enabled_ports().collect::<Vec<_>>(), vec![PortNumber::new(1)]);
        assert!(device.port(PortNumber::new(3)).is_none());
    }
}
