// ── Topology walker ──

use std::fmt;

use serde::Serialize;

use crate::model::{ConnectPoint, Host};
use crate::providers::{DeviceProvider, HostProvider, LinkProvider};

/// Why an egress port leads nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadEndReason {
    /// The device has no such port.
    PortMissing,
    /// The port exists but is administratively down.
    PortDisabled,
    /// Nothing is attached to the port.
    NoLinks,
}

impl fmt::Display for DeadEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PortMissing => "port missing",
            Self::PortDisabled => "port disabled",
            Self::NoLinks => "no links",
        })
    }
}

/// Where a packet sent out of a connect point goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHop {
    /// Ingress connect points of the devices on the far side of links.
    ToDevice(Vec<ConnectPoint>),
    ToHost(Vec<Host>),
    /// Both links and attached hosts.
    Branch {
        devices: Vec<ConnectPoint>,
        hosts: Vec<Host>,
    },
    DeadEnd(DeadEndReason),
}

/// Resolves an egress connect point against links and host locations.
#[derive(Debug, Clone, Copy)]
pub struct TopologyWalker<'v, V: ?Sized> {
    view: &'v V,
}

impl<'v, V> TopologyWalker<'v, V>
where
    V: LinkProvider + HostProvider + DeviceProvider + ?Sized,
{
    pub fn new(view: &'v V) -> Self {
        Self { view }
    }

    pub fn next(&self, egress: &ConnectPoint) -> NextHop {
        // Devices that publish no port list are not checked.
        if let Some(device) = self.view.device(&egress.device) {
            if !device.ports.is_empty() {
                match device.port(egress.port) {
                    None => return NextHop::DeadEnd(DeadEndReason::PortMissing),
                    Some(port) if !port.enabled => {
                        return NextHop::DeadEnd(DeadEndReason::PortDisabled);
                    }
                    Some(_) => {}
                }
            }
        }

        let devices: Vec<ConnectPoint> = self
            .view
            .egress_links_of(egress)
            .iter()
            .map(|link| link.dst.clone())
            .collect();
        let hosts: Vec<Host> = self.view.hosts_at(egress).iter().cloned().collect();

        match (devices.is_empty(), hosts.is_empty()) {
            (true, true) => NextHop::DeadEnd(DeadEndReason::NoLinks),
            (false, true) => NextHop::ToDevice(devices),
            (true, false) => NextHop::ToHost(hosts),
            (false, false) => NextHop::Branch { devices, hosts },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Device, Link, PortNumber, VlanId};
    use crate::store::{NetworkSnapshot, SnapshotDocument};

    fn cp(device: &str, port: u64) -> ConnectPoint {
        ConnectPoint::new(device, PortNumber::new(port))
    }

    fn snapshot() -> NetworkSnapshot {
        let mut s2 = Device::new("s2").with_ports([1, 2, 3]);
        s2.ports[2].enabled = false;
        let document = SnapshotDocument {
            devices: vec![Device::new("s1").with_ports([1, 2, 3]), s2, Device::new("s3")],
            links: vec![Link::new(cp("s1", 2), cp("s2", 1))],
            hosts: vec![
                Host::new("00:00:00:00:00:01".parse().unwrap(), VlanId::NONE, cp("s1", 1)),
                Host::new("00:00:00:00:00:02".parse().unwrap(), VlanId::NONE, cp("s1", 2)),
            ],
            ..SnapshotDocument::default()
        };
        NetworkSnapshot::from_document(document).unwrap()
    }

    #[test]
    fn classifies_egress_points() {
        let snap = snapshot();
        let walker = TopologyWalker::new(&snap);
        assert!(matches!(walker.next(&cp("s1", 1)), NextHop::ToHost(h) if h.len() == 1));
        assert!(matches!(walker.next(&cp("s1", 2)), NextHop::Branch { .. }));
        assert_eq!(walker.next(&cp("s2", 2)), NextHop::DeadEnd(DeadEndReason::NoLinks));
        assert_eq!(walker.next(&cp("s2", 3)), NextHop::DeadEnd(DeadEndReason::PortDisabled));
        assert_eq!(walker.next(&cp("s2", 9)), NextHop::DeadEnd(DeadEndReason::PortMissing));
    }

    #[test]
    fn devices_without_port_list_are_not_checked() {
        let snap = snapshot();
        let walker = TopologyWalker::new(&snap);
        assert_eq!(walker.next(&cp("s3", 7)), NextHop::DeadEnd(DeadEndReason::NoLinks));
    }
}
