// ── Core identity types ──
//
// Device ids, port numbers, connect points, MAC addresses and VLAN ids
// are the vocabulary every other model type is written in. All of them
// render to and parse from the compact text forms operators type on the
// command line (`of:0000000000000001/2`, `aa:bb:cc:dd:ee:ff`, `None`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── DeviceId ────────────────────────────────────────────────────────

/// Identifier of a forwarding element (e.g. `of:0000000000000001`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Parse {
                kind: "device id",
                input: s.to_owned(),
                reason: "empty".into(),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── PortNumber ──────────────────────────────────────────────────────

/// Port number, including the OpenFlow reserved logical ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PortRepr", into = "PortRepr")]
pub struct PortNumber(u64);

impl PortNumber {
    pub const IN_PORT: Self = Self(0xffff_fff8);
    pub const TABLE: Self = Self(0xffff_fff9);
    pub const NORMAL: Self = Self(0xffff_fffa);
    pub const FLOOD: Self = Self(0xffff_fffb);
    pub const ALL: Self = Self(0xffff_fffc);
    pub const CONTROLLER: Self = Self(0xffff_fffd);
    pub const LOCAL: Self = Self(0xffff_fffe);
    pub const ANY: Self = Self(0xffff_ffff);

    const LOGICAL: [(Self, &'static str); 8] = [
        (Self::IN_PORT, "IN_PORT"),
        (Self::TABLE, "TABLE"),
        (Self::NORMAL, "NORMAL"),
        (Self::FLOOD, "FLOOD"),
        (Self::ALL, "ALL"),
        (Self::CONTROLLER, "CONTROLLER"),
        (Self::LOCAL, "LOCAL"),
        (Self::ANY, "ANY"),
    ];

    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this is one of the reserved logical ports.
    pub fn is_logical(self) -> bool {
        self.0 >= Self::IN_PORT.0
    }

    fn logical_name(self) -> Option<&'static str> {
        Self::LOGICAL
            .iter()
            .find(|(port, _)| *port == self)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.logical_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for PortNumber {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some((port, _)) = Self::LOGICAL
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(trimmed))
        {
            return Ok(*port);
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|e| CoreError::Parse {
                kind: "port number",
                input: s.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl From<u64> for PortNumber {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u64),
    Name(String),
}

impl TryFrom<PortRepr> for PortNumber {
    type Error = CoreError;

    fn try_from(repr: PortRepr) -> Result<Self, Self::Error> {
        match repr {
            PortRepr::Number(n) => Ok(Self(n)),
            PortRepr::Name(s) => s.parse(),
        }
    }
}

impl From<PortNumber> for PortRepr {
    fn from(port: PortNumber) -> Self {
        match port.logical_name() {
            Some(name) => Self::Name(name.to_owned()),
            None => Self::Number(port.0),
        }
    }
}

// ── ConnectPoint ────────────────────────────────────────────────────

/// A device-local interface: `(device, port)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectPoint {
    pub device: DeviceId,
    pub port: PortNumber,
}

impl ConnectPoint {
    pub fn new(device: impl Into<DeviceId>, port: impl Into<PortNumber>) -> Self {
        Self {
            device: device.into(),
            port: port.into(),
        }
    }

    /// The same device with a different port.
    pub fn with_port(&self, port: PortNumber) -> Self {
        Self {
            device: self.device.clone(),
            port,
        }
    }
}

impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.port)
    }
}

impl FromStr for ConnectPoint {
    type Err = CoreError;

    /// Parses `device/port`. The split happens at the last `/` so device
    /// ids may themselves contain slashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, port) = s.trim().rsplit_once('/').ok_or_else(|| CoreError::Parse {
            kind: "connect point",
            input: s.to_owned(),
            reason: "expected <device>/<port>".into(),
        })?;
        Ok(Self {
            device: device.parse()?,
            port: port.parse()?,
        })
    }
}

impl TryFrom<String> for ConnectPoint {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ConnectPoint> for String {
    fn from(cp: ConnectPoint) -> Self {
        cp.to_string()
    }
}

// ── MacAddress ──────────────────────────────────────────────────────

/// 48-bit MAC address, rendered lowercase colon-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: Self = Self([0xff; 6]);
    pub const ZERO: Self = Self([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group bit of the first octet.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Whether `self` and `other` agree on every bit set in `mask`.
    pub fn matches_masked(&self, other: &Self, mask: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .zip(mask.0.iter())
            .all(|((a, b), m)| a & m == b & m)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    /// Accepts colon- or dash-separated hex, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| CoreError::Parse {
            kind: "MAC address",
            input: s.to_owned(),
            reason: reason.to_owned(),
        };
        let normalized = s.trim().replace('-', ":");
        let mut octets = [0u8; 6];
        let mut parts = normalized.split(':');
        for slot in &mut octets {
            let part = parts.next().ok_or_else(|| err("expected six octets"))?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| err("invalid hex octet"))?;
        }
        if parts.next().is_some() {
            return Err(err("expected six octets"));
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

// ── VlanId ──────────────────────────────────────────────────────────

/// 802.1Q VLAN id. [`VlanId::NONE`] stands for an untagged packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "VlanRepr", into = "VlanRepr")]
pub struct VlanId(u16);

impl VlanId {
    pub const NONE: Self = Self(0xffff);
    pub const MAX: u16 = 4095;

    pub fn new(id: u16) -> Result<Self, CoreError> {
        if id > Self::MAX {
            return Err(CoreError::Parse {
                kind: "VLAN id",
                input: id.to_string(),
                reason: format!("must be at most {}", Self::MAX),
            });
        }
        Ok(Self(id))
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("None")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for VlanId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }
        let id = trimmed.parse::<u16>().map_err(|e| CoreError::Parse {
            kind: "VLAN id",
            input: s.to_owned(),
            reason: e.to_string(),
        })?;
        Self::new(id)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum VlanRepr {
    Number(u16),
    Name(String),
}

impl TryFrom<VlanRepr> for VlanId {
    type Error = CoreError;

    fn try_from(repr: VlanRepr) -> Result<Self, Self::Error> {
        match repr {
            VlanRepr::Number(n) => Self::new(n),
            VlanRepr::Name(s) => s.parse(),
        }
    }
}

impl From<VlanId> for VlanRepr {
    fn from(vlan: VlanId) -> Self {
        if vlan.is_none() {
            Self::Name("None".into())
        } else {
            Self::Number(vlan.0)
        }
    }
}

// ── HostId ──────────────────────────────────────────────────────────

/// Host identity: `mac/vlan`, e.g. `00:00:00:00:00:01/None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostId {
    pub mac: MacAddress,
    pub vlan: VlanId,
}

impl HostId {
    pub fn new(mac: MacAddress, vlan: VlanId) -> Self {
        Self { mac, vlan }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mac, self.vlan)
    }
}

impl FromStr for HostId {
    type Err = CoreError;

    /// A bare MAC is accepted and means the untagged host.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((mac, vlan)) => Ok(Self::new(mac.parse()?, vlan.parse()?)),
            None => Ok(Self::new(s.parse()?, VlanId::NONE)),
        }
    }
}

impl TryFrom<String> for HostId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HostId> for String {
    fn from(id: HostId) -> Self {
        id.to_string()
    }
}
