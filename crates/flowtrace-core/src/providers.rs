// ── Read-only provider interfaces ──
//
// The engine never owns network state. It reads flows, groups, links,
// hosts and devices through these traits, each returning point-in-time
// snapshots (cheap `Arc` clones where the backing store allows it).

use std::net::IpAddr;
use std::sync::Arc;

use crate::model::{ConnectPoint, Device, DeviceId, FlowEntry, Group, Host, HostId, Link, MacAddress};

/// Installed flow entries, in insertion order per device.
pub trait FlowProvider {
    fn entries_of(&self, device: &DeviceId) -> Arc<Vec<FlowEntry>>;
}

pub trait GroupProvider {
    fn groups_of(&self, device: &DeviceId) -> Arc<Vec<Group>>;
}

pub trait LinkProvider {
    /// Links whose source is `cp`.
    fn egress_links_of(&self, cp: &ConnectPoint) -> Arc<Vec<Link>>;

    fn links(&self) -> Vec<Link>;
}

pub trait HostProvider {
    /// Hosts attached at `cp`.
    fn hosts_at(&self, cp: &ConnectPoint) -> Arc<Vec<Host>>;

    fn hosts_by_mac(&self, mac: &MacAddress) -> Arc<Vec<Host>>;

    fn hosts_by_ip(&self, ip: &IpAddr) -> Arc<Vec<Host>>;

    fn host(&self, id: &HostId) -> Option<Host>;

    fn hosts(&self) -> Vec<Host>;
}

pub trait DeviceProvider {
    fn device(&self, id: &DeviceId) -> Option<Device>;

    fn devices(&self) -> Vec<Device>;

    /// Driver identifier of a device, if it is known and declares one.
    fn driver_of(&self, id: &DeviceId) -> Option<String> {
        self.device(id).and_then(|d| d.driver)
    }
}

/// Everything a trace reads. Blanket-implemented for any type that
/// provides all five views.
pub trait NetworkView:
    FlowProvider + GroupProvider + LinkProvider + HostProvider + DeviceProvider
{
}

impl<T> NetworkView for T where
    T: FlowProvider + GroupProvider + LinkProvider + HostProvider + DeviceProvider + ?Sized
{
}
