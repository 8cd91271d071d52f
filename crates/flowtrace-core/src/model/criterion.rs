// ── Header criteria ──
//
// A `Criterion` is one typed header field value. Flow entries match on
// sets of them, and a `Packet` is nothing more than at most one criterion
// per `CriterionType`. The text form is `TYPE=value`, which is also how
// criteria appear in snapshot files.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::identity::{MacAddress, PortNumber, VlanId};
use super::packet::Packet;
use crate::error::CoreError;

/// Well-known Ethernet types.
pub mod ether_type {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86dd;
    pub const MPLS_UNICAST: u16 = 0x8847;
    pub const MPLS_MULTICAST: u16 = 0x8848;
    pub const LLDP: u16 = 0x88cc;
    pub const BDDP: u16 = 0x8942;

    const NAMED: [(&str, u16); 8] = [
        ("ipv4", IPV4),
        ("arp", ARP),
        ("vlan", VLAN),
        ("ipv6", IPV6),
        ("mpls_unicast", MPLS_UNICAST),
        ("mpls_multicast", MPLS_MULTICAST),
        ("lldp", LLDP),
        ("bddp", BDDP),
    ];

    /// Resolve a symbolic name (`ipv4`, `lldp`, ...) to its value.
    pub fn by_name(name: &str) -> Option<u16> {
        NAMED
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Symbolic name of a well-known value.
    pub fn name_of(value: u16) -> Option<&'static str> {
        NAMED.iter().find(|(_, v)| *v == value).map(|(n, _)| *n)
    }

    /// A symbolic name, or a decimal or `0x` hex value.
    pub fn parse(value: &str) -> Result<u16, crate::error::CoreError> {
        super::parse_eth_type(value.trim()).map_err(|reason| crate::error::CoreError::Parse {
            kind: "eth type",
            input: value.to_owned(),
            reason,
        })
    }
}

/// The header field a criterion constrains.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionType {
    InPort,
    Metadata,
    EthDst,
    EthDstMasked,
    EthSrc,
    EthSrcMasked,
    EthType,
    VlanVid,
    IpProto,
    Ipv4Src,
    Ipv4Dst,
    Ipv6Src,
    Ipv6Dst,
    TcpSrc,
    TcpDst,
    UdpSrc,
    UdpDst,
    MplsLabel,
    MplsBos,
}

/// One typed header field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Criterion {
    InPort(PortNumber),
    Metadata(u64),
    EthDst(MacAddress),
    EthDstMasked { mac: MacAddress, mask: MacAddress },
    EthSrc(MacAddress),
    EthSrcMasked { mac: MacAddress, mask: MacAddress },
    EthType(u16),
    VlanVid(VlanId),
    IpProto(u8),
    Ipv4Src(Ipv4Network),
    Ipv4Dst(Ipv4Network),
    Ipv6Src(Ipv6Network),
    Ipv6Dst(Ipv6Network),
    TcpSrc(u16),
    TcpDst(u16),
    UdpSrc(u16),
    UdpDst(u16),
    MplsLabel(u32),
    MplsBos(bool),
}

impl Criterion {
    pub fn criterion_type(&self) -> CriterionType {
        match self {
            Self::InPort(_) => CriterionType::InPort,
            Self::Metadata(_) => CriterionType::Metadata,
            Self::EthDst(_) => CriterionType::EthDst,
            Self::EthDstMasked { .. } => CriterionType::EthDstMasked,
            Self::EthSrc(_) => CriterionType::EthSrc,
            Self::EthSrcMasked { .. } => CriterionType::EthSrcMasked,
            Self::EthType(_) => CriterionType::EthType,
            Self::VlanVid(_) => CriterionType::VlanVid,
            Self::IpProto(_) => CriterionType::IpProto,
            Self::Ipv4Src(_) => CriterionType::Ipv4Src,
            Self::Ipv4Dst(_) => CriterionType::Ipv4Dst,
            Self::Ipv6Src(_) => CriterionType::Ipv6Src,
            Self::Ipv6Dst(_) => CriterionType::Ipv6Dst,
            Self::TcpSrc(_) => CriterionType::TcpSrc,
            Self::TcpDst(_) => CriterionType::TcpDst,
            Self::UdpSrc(_) => CriterionType::UdpSrc,
            Self::UdpDst(_) => CriterionType::UdpDst,
            Self::MplsLabel(_) => CriterionType::MplsLabel,
            Self::MplsBos(_) => CriterionType::MplsBos,
        }
    }

    /// Whether a packet satisfies this criterion.
    ///
    /// IP criteria match by prefix containment of the packet's address.
    /// Masked MAC criteria compare under the mask and are satisfied by a
    /// packet carrying no MAC in that direction. Everything else requires
    /// the packet to hold an identical criterion.
    pub fn matches(&self, packet: &Packet) -> bool {
        match self {
            Self::Ipv4Src(net) | Self::Ipv4Dst(net) => {
                match packet.criterion(self.criterion_type()) {
                    Some(Self::Ipv4Src(p) | Self::Ipv4Dst(p)) => net.contains(p.ip()),
                    _ => false,
                }
            }
            Self::Ipv6Src(net) | Self::Ipv6Dst(net) => {
                match packet.criterion(self.criterion_type()) {
                    Some(Self::Ipv6Src(p) | Self::Ipv6Dst(p)) => net.contains(p.ip()),
                    _ => false,
                }
            }
            Self::EthDstMasked { mac, mask } => packet
                .eth_dst()
                .is_none_or(|actual| actual.matches_masked(mac, mask)),
            Self::EthSrcMasked { mac, mask } => packet
                .eth_src()
                .is_none_or(|actual| actual.matches_masked(mac, mask)),
            _ => packet.criterion(self.criterion_type()) == Some(self),
        }
    }

    /// The address carried by an IP criterion.
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ipv4Src(n) | Self::Ipv4Dst(n) => Some(IpAddr::V4(n.ip())),
            Self::Ipv6Src(n) | Self::Ipv6Dst(n) => Some(IpAddr::V6(n.ip())),
            _ => None,
        }
    }

    fn value_string(&self) -> String {
        match self {
            Self::InPort(p) => p.to_string(),
            Self::Metadata(m) => format!("{m:#x}"),
            Self::EthDst(mac) | Self::EthSrc(mac) => mac.to_string(),
            Self::EthDstMasked { mac, mask } | Self::EthSrcMasked { mac, mask } => {
                format!("{mac}/{mask}")
            }
            Self::EthType(t) => format!("{t:#06x}"),
            Self::VlanVid(v) => v.to_string(),
            Self::IpProto(p) => p.to_string(),
            Self::Ipv4Src(n) | Self::Ipv4Dst(n) => n.to_string(),
            Self::Ipv6Src(n) | Self::Ipv6Dst(n) => n.to_string(),
            Self::TcpSrc(p) | Self::TcpDst(p) | Self::UdpSrc(p) | Self::UdpDst(p) => p.to_string(),
            Self::MplsLabel(l) => l.to_string(),
            Self::MplsBos(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.criterion_type(), self.value_string())
    }
}

impl FromStr for Criterion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').ok_or_else(|| CoreError::Parse {
            kind: "criterion",
            input: s.to_owned(),
            reason: "expected TYPE=value".into(),
        })?;
        let kind = key
            .trim()
            .parse::<CriterionType>()
            .map_err(|_| CoreError::Parse {
                kind: "criterion type",
                input: key.trim().to_owned(),
                reason: "unknown field".into(),
            })?;
        let value = value.trim();
        let invalid = |reason: String| CoreError::Parse {
            kind: "criterion value",
            input: s.to_owned(),
            reason,
        };

        let criterion = match kind {
            CriterionType::InPort => Self::InPort(value.parse()?),
            CriterionType::Metadata => Self::Metadata(parse_u64(value).map_err(invalid)?),
            CriterionType::EthDst => Self::EthDst(value.parse()?),
            CriterionType::EthSrc => Self::EthSrc(value.parse()?),
            CriterionType::EthDstMasked => {
                let (mac, mask) = parse_masked_mac(value)?;
                Self::EthDstMasked { mac, mask }
            }
            CriterionType::EthSrcMasked => {
                let (mac, mask) = parse_masked_mac(value)?;
                Self::EthSrcMasked { mac, mask }
            }
            CriterionType::EthType => Self::EthType(parse_eth_type(value).map_err(invalid)?),
            CriterionType::VlanVid => Self::VlanVid(value.parse()?),
            CriterionType::IpProto => {
                Self::IpProto(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
            CriterionType::Ipv4Src => {
                Self::Ipv4Src(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
            CriterionType::Ipv4Dst => {
                Self::Ipv4Dst(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
            CriterionType::Ipv6Src => {
                Self::Ipv6Src(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
            CriterionType::Ipv6Dst => {
                Self::Ipv6Dst(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
            CriterionType::TcpSrc => Self::TcpSrc(value.parse().map_err(|e| invalid(format!("{e}")))?),
            CriterionType::TcpDst => Self::TcpDst(value.parse().map_err(|e| invalid(format!("{e}")))?),
            CriterionType::UdpSrc => Self::UdpSrc(value.parse().map_err(|e| invalid(format!("{e}")))?),
            CriterionType::UdpDst => Self::UdpDst(value.parse().map_err(|e| invalid(format!("{e}")))?),
            CriterionType::MplsLabel => {
                Self::MplsLabel(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
            CriterionType::MplsBos => {
                Self::MplsBos(value.parse().map_err(|e| invalid(format!("{e}")))?)
            }
        };
        Ok(criterion)
    }
}

impl TryFrom<String> for Criterion {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Criterion> for String {
    fn from(c: Criterion) -> Self {
        c.to_string()
    }
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_u64(value: &str) -> Result<u64, String> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => value.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

/// Accepts `0x0800`, `2048` or a symbolic name such as `ipv4`.
pub(crate) fn parse_eth_type(value: &str) -> Result<u16, String> {
    if let Some(known) = ether_type::by_name(value) {
        return Ok(known);
    }
    let raw = parse_u64(value)?;
    u16::try_from(raw).map_err(|_| format!("{raw:#x} does not fit in 16 bits"))
}

fn parse_masked_mac(value: &str) -> Result<(MacAddress, MacAddress), CoreError> {
    match value.split_once('/') {
        Some((mac, mask)) => Ok((mac.parse()?, mask.parse()?)),
        None => Ok((value.parse()?, MacAddress::BROADCAST)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_values() {
        let c: Criterion = "eth_type=ipv4".parse().unwrap();
        assert_eq!(c, Criterion::EthType(ether_type::IPV4));
        assert_eq!(c.to_string(), "ETH_TYPE=0x0800");

        let c: Criterion = "VLAN_VID=none".parse().unwrap();
        assert_eq!(c, Criterion::VlanVid(VlanId::NONE));

        let c: Criterion = "in_port=controller".parse().unwrap();
        assert_eq!(c, Criterion::InPort(PortNumber::CONTROLLER));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!("tos=4".parse::<Criterion>().is_err());
        assert!("eth_type".parse::<Criterion>().is_err());
    }

    #[test]
    fn ip_criterion_matches_by_prefix() {
        let rule: Criterion = "IPV4_DST=10.0.0.0/24".parse().unwrap();
        let inside = Packet::new().with_criterion("IPV4_DST=10.0.0.7/32".parse().unwrap());
        let outside = Packet::new().with_criterion("IPV4_DST=10.0.1.7/32".parse().unwrap());
        assert!(rule.matches(&inside));
        assert!(!rule.matches(&outside));
        assert!(!rule.matches(&Packet::new()));
    }

    #[test]
    fn masked_mac_matches_missing_field() {
        let rule: Criterion = "ETH_DST_MASKED=01:00:5e:00:00:00/ff:ff:ff:80:00:00"
            .parse()
            .unwrap();
        assert!(rule.matches(&Packet::new()));
        let mcast = Packet::new().with_criterion("ETH_DST=01:00:5e:00:00:fb".parse().unwrap());
        let ucast = Packet::new().with_criterion("ETH_DST=00:00:00:00:00:01".parse().unwrap());
        assert!(rule.matches(&mcast));
        assert!(!rule.matches(&ucast));
    }

    #[test]
    fn exact_criterion_requires_equal_value() {
        let rule = Criterion::VlanVid(VlanId::new(10).unwrap());
        let tagged = Packet::new().with_criterion(Criterion::VlanVid(VlanId::new(10).unwrap()));
        let other = Packet::new().with_criterion(Criterion::VlanVid(VlanId::new(20).unwrap()));
        assert!(rule.matches(&tagged));
        assert!(!rule.matches(&other));
    }
}
