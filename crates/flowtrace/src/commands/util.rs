//! Shared helpers for command handlers.

use flowtrace_core::model::{DeviceId, Host, HostId, ether_type};
use flowtrace_core::providers::{DeviceProvider, HostProvider};
use flowtrace_core::NetworkSnapshot;

use crate::error::CliError;

/// Look up a host by `MAC` or `MAC/VLAN`.
pub fn resolve_host(snapshot: &NetworkSnapshot, raw: &str) -> Result<Host, CliError> {
    let id: HostId = raw.parse()?;
    snapshot.host(&id).ok_or_else(|| CliError::NotFound {
        resource_type: "host".into(),
        identifier: id.to_string(),
        list_command: "hosts".into(),
    })
}

/// Parse a device filter, rejecting devices the snapshot does not know.
pub fn resolve_device(
    snapshot: &NetworkSnapshot,
    raw: Option<&str>,
) -> Result<Option<DeviceId>, CliError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let id: DeviceId = raw.parse()?;
    if snapshot.device(&id).is_none() {
        return Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: id.to_string(),
            list_command: "devices".into(),
        });
    }
    Ok(Some(id))
}

/// Ethernet type for host-based probes: only IPv4 and IPv6 make sense.
pub fn probe_eth_type(raw: &str) -> Result<u16, CliError> {
    let value = ether_type::parse(raw)?;
    match value {
        ether_type::IPV4 | ether_type::IPV6 => Ok(value),
        other => Err(CliError::validation(
            "eth-type",
            format!("{other:#06x} is not ipv4 or ipv6"),
        )),
    }
}

pub fn join<T: ToString>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}
