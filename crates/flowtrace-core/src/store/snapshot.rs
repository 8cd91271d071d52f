// ── In-memory network snapshot ──
//
// A `SnapshotDocument` is the on-disk shape (JSON, YAML or TOML). Loading
// validates it and indexes it into a `NetworkSnapshot`, which implements
// every provider trait the engine reads through.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use super::catalog::Catalog;
use crate::error::CoreError;
use crate::model::{
    ConnectPoint, Device, DeviceId, FlowEntry, Group, Host, HostId, Link, MacAddress,
};
use crate::providers::{DeviceProvider, FlowProvider, GroupProvider, HostProvider, LinkProvider};

/// Serialized form of a snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub flows: Vec<FlowEntry>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// Snapshot file encodings, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SnapshotFormat {
    Json,
    #[strum(to_string = "yaml", serialize = "yml")]
    Yaml,
    Toml,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        extension.parse().map_err(|_| CoreError::SnapshotFormat {
            extension: extension.to_owned(),
        })
    }
}

impl SnapshotDocument {
    pub fn parse(text: &str, format: SnapshotFormat) -> Result<Self, CoreError> {
        let invalid = |reason: String| CoreError::SnapshotInvalid { message: reason };
        match format {
            SnapshotFormat::Json => serde_json::from_str(text).map_err(|e| invalid(e.to_string())),
            SnapshotFormat::Yaml => serde_yaml::from_str(text).map_err(|e| invalid(e.to_string())),
            SnapshotFormat::Toml => toml::from_str(text).map_err(|e| invalid(e.to_string())),
        }
    }

    pub fn render(&self, format: SnapshotFormat) -> Result<String, CoreError> {
        let invalid = |reason: String| CoreError::SnapshotInvalid { message: reason };
        match format {
            SnapshotFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| invalid(e.to_string()))
            }
            SnapshotFormat::Yaml => serde_yaml::to_string(self).map_err(|e| invalid(e.to_string())),
            SnapshotFormat::Toml => toml::to_string_pretty(self).map_err(|e| invalid(e.to_string())),
        }
    }

    /// Structural checks that make the document safe to index.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut devices = HashSet::new();
        for device in &self.devices {
            if !devices.insert(&device.id) {
                return Err(invalid(format!("duplicate device {}", device.id)));
            }
        }

        let known = |id: &DeviceId, what: &str| -> Result<(), CoreError> {
            if devices.contains(id) {
                Ok(())
            } else {
                Err(invalid(format!("{what} references unknown device {id}")))
            }
        };

        for flow in &self.flows {
            known(&flow.device, "flow entry")?;
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            known(&group.device, "group")?;
            if !group_ids.insert((&group.device, group.id)) {
                return Err(invalid(format!(
                    "duplicate group {} on device {}",
                    group.id, group.device
                )));
            }
        }

        for link in &self.links {
            known(&link.src.device, "link source")?;
            known(&link.dst.device, "link destination")?;
        }

        let mut host_ids = HashSet::new();
        for host in &self.hosts {
            if !host_ids.insert(host.id()) {
                return Err(invalid(format!("duplicate host {}", host.id())));
            }
            if host.locations.is_empty() {
                return Err(invalid(format!("host {} has no location", host.id())));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::SnapshotInvalid { message }
}

/// Indexed, read-only view of a validated snapshot document.
#[derive(Debug, Clone)]
pub struct NetworkSnapshot {
    devices: IndexMap<DeviceId, Device>,
    flows: Catalog<DeviceId, FlowEntry>,
    groups: Catalog<DeviceId, Group>,
    links: Catalog<ConnectPoint, Link>,
    hosts: IndexMap<HostId, Host>,
    hosts_at: Catalog<ConnectPoint, Host>,
    hosts_by_mac: Catalog<MacAddress, Host>,
    hosts_by_ip: Catalog<IpAddr, Host>,
}

impl NetworkSnapshot {
    /// Read and index a snapshot file; the format follows the extension.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let format = SnapshotFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::SnapshotLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let document = SnapshotDocument::parse(&text, format).map_err(|e| match e {
            CoreError::SnapshotInvalid { message } => CoreError::SnapshotLoad {
                path: path.to_path_buf(),
                reason: message,
            },
            other => other,
        })?;
        let snapshot = Self::from_document(document)?;
        debug!(
            path = %path.display(),
            devices = snapshot.devices.len(),
            flows = snapshot.flows.len(),
            groups = snapshot.groups.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn from_document(document: SnapshotDocument) -> Result<Self, CoreError> {
        document.validate()?;

        let mut snapshot = Self {
            devices: IndexMap::new(),
            flows: Catalog::new(),
            groups: Catalog::new(),
            links: Catalog::new(),
            hosts: IndexMap::new(),
            hosts_at: Catalog::new(),
            hosts_by_mac: Catalog::new(),
            hosts_by_ip: Catalog::new(),
        };

        for device in document.devices {
            snapshot.devices.insert(device.id.clone(), device);
        }
        for flow in document.flows {
            snapshot.flows.push(flow.device.clone(), flow);
        }
        for group in document.groups {
            snapshot.groups.push(group.device.clone(), group);
        }
        for link in document.links {
            snapshot.links.push(link.src.clone(), link);
        }
        for host in document.hosts {
            for location in &host.locations {
                if !snapshot.devices.contains_key(&location.device) {
                    warn!(host = %host.id(), %location, "host attached to unknown device");
                }
                snapshot.hosts_at.push(location.clone(), host.clone());
            }
            snapshot.hosts_by_mac.push(host.mac, host.clone());
            let ips: BTreeSet<IpAddr> = host.ips.iter().copied().collect();
            for ip in ips {
                snapshot.hosts_by_ip.push(ip, host.clone());
            }
            snapshot.hosts.insert(host.id(), host);
        }
        Ok(snapshot)
    }

    /// Rebuild the serializable document. Links come back grouped by source.
    pub fn to_document(&self) -> SnapshotDocument {
        SnapshotDocument {
            devices: self.devices.values().cloned().collect(),
            flows: self.flows.values().cloned().collect(),
            groups: self.groups.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
            hosts: self.hosts.values().cloned().collect(),
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

// ── Provider implementations ────────────────────────────────────────

impl FlowProvider for NetworkSnapshot {
    fn entries_of(&self, device: &DeviceId) -> Arc<Vec<FlowEntry>> {
        self.flows.get(device)
    }
}

impl GroupProvider for NetworkSnapshot {
    fn groups_of(&self, device: &DeviceId) -> Arc<Vec<Group>> {
        self.groups.get(device)
    }
}

impl LinkProvider for NetworkSnapshot {
    fn egress_links_of(&self, cp: &ConnectPoint) -> Arc<Vec<Link>> {
        self.links.get(cp)
    }

    fn links(&self) -> Vec<Link> {
        self.links.values().cloned().collect()
    }
}

impl HostProvider for NetworkSnapshot {
    fn hosts_at(&self, cp: &ConnectPoint) -> Arc<Vec<Host>> {
        self.hosts_at.get(cp)
    }

    fn hosts_by_mac(&self, mac: &MacAddress) -> Arc<Vec<Host>> {
        self.hosts_by_mac.get(mac)
    }

    fn hosts_by_ip(&self, ip: &IpAddr) -> Arc<Vec<Host>> {
        self.hosts_by_ip.get(ip)
    }

    fn host(&self, id: &HostId) -> Option<Host> {
        self.hosts.get(id).cloned()
    }

    fn hosts(&self) -> Vec<Host> {
        self.hosts.values().cloned().collect()
    }
}

impl DeviceProvider for NetworkSnapshot {
    fn device(&self, id: &DeviceId) -> Option<Device> {
        self.devices.get(id).cloned()
    }

    fn devices(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }
}
