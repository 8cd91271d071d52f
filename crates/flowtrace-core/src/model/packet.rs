// ── Symbolic packet ──

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::criterion::{Criterion, CriterionType};
use super::identity::{MacAddress, PortNumber, VlanId};
use crate::error::CoreError;

/// An immutable header snapshot: at most one criterion per type.
///
/// Every transformation returns a new `Packet`. Equality and hashing are
/// structural, so two packets built through different modification orders
/// compare equal when they carry the same fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Criterion>", into = "Vec<Criterion>")]
pub struct Packet {
    fields: BTreeMap<CriterionType, Criterion>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `criterion` written over any value of its type.
    pub fn with_criterion(&self, criterion: Criterion) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(criterion.criterion_type(), criterion);
        Self { fields }
    }

    /// Returns a copy with every criterion of the given types removed.
    pub fn without(&self, types: &[CriterionType]) -> Self {
        let mut fields = self.fields.clone();
        for kind in types {
            fields.remove(kind);
        }
        Self { fields }
    }

    pub fn criterion(&self, kind: CriterionType) -> Option<&Criterion> {
        self.fields.get(&kind)
    }

    /// Criteria in canonical type order.
    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // ── Typed accessors ──────────────────────────────────────────────

    pub fn in_port(&self) -> Option<PortNumber> {
        match self.criterion(CriterionType::InPort) {
            Some(Criterion::InPort(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn eth_type(&self) -> Option<u16> {
        match self.criterion(CriterionType::EthType) {
            Some(Criterion::EthType(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn vlan(&self) -> Option<VlanId> {
        match self.criterion(CriterionType::VlanVid) {
            Some(Criterion::VlanVid(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<u64> {
        match self.criterion(CriterionType::Metadata) {
            Some(Criterion::Metadata(m)) => Some(*m),
            _ => None,
        }
    }

    /// Destination MAC, exact or masked.
    pub fn eth_dst(&self) -> Option<MacAddress> {
        match self
            .criterion(CriterionType::EthDst)
            .or_else(|| self.criterion(CriterionType::EthDstMasked))
        {
            Some(Criterion::EthDst(mac) | Criterion::EthDstMasked { mac, .. }) => Some(*mac),
            _ => None,
        }
    }

    /// Source MAC, exact or masked.
    pub fn eth_src(&self) -> Option<MacAddress> {
        match self
            .criterion(CriterionType::EthSrc)
            .or_else(|| self.criterion(CriterionType::EthSrcMasked))
        {
            Some(Criterion::EthSrc(mac) | Criterion::EthSrcMasked { mac, .. }) => Some(*mac),
            _ => None,
        }
    }

    /// Destination IP addresses carried by the packet (v4 first).
    pub fn ip_dsts(&self) -> Vec<IpAddr> {
        [CriterionType::Ipv4Dst, CriterionType::Ipv6Dst]
            .into_iter()
            .filter_map(|kind| self.criterion(kind).and_then(Criterion::ip))
            .collect()
    }
}

impl From<Vec<Criterion>> for Packet {
    fn from(criteria: Vec<Criterion>) -> Self {
        criteria.into_iter().collect()
    }
}

impl From<Packet> for Vec<Criterion> {
    fn from(packet: Packet) -> Self {
        packet.fields.into_values().collect()
    }
}

impl FromIterator<Criterion> for Packet {
    /// Later criteria of the same type overwrite earlier ones.
    fn from_iter<I: IntoIterator<Item = Criterion>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|c| (c.criterion_type(), c))
            .collect();
        Self { fields }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.criteria().map(ToString::to_string).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

impl FromStr for Packet {
    type Err = CoreError;

    /// Comma-separated `TYPE=value` list, optionally wrapped in brackets.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
        inner
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<Criterion>)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn with_criterion_overwrites_and_leaves_original() {
        let base: Packet = "IN_PORT=1, VLAN_VID=10".parse().unwrap();
        let updated = base.with_criterion(Criterion::VlanVid(VlanId::new(20).unwrap()));
        assert_eq!(base.vlan(), Some(VlanId::new(10).unwrap()));
        assert_eq!(updated.vlan(), Some(VlanId::new(20).unwrap()));
        assert_eq!(updated.len(), 2);
    }

    #[test]
    fn equality_is_structural() {
        let a: Packet = "ETH_TYPE=ipv4, IN_PORT=1".parse().unwrap();
        let b: Packet = "IN_PORT=1, ETH_TYPE=0x800".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_lookup_is_absent() {
        let p: Packet = "IN_PORT=1".parse().unwrap();
        assert!(p.criterion(CriterionType::MplsLabel).is_none());
        assert!(p.eth_dst().is_none());
    }

    #[test]
    fn display_is_canonical() {
        let p: Packet = "[ETH_TYPE=ipv4, IN_PORT=3]".parse().unwrap();
        assert_eq!(p.to_string(), "[IN_PORT=3, ETH_TYPE=0x0800]");
    }

    #[test]
    fn serde_uses_criterion_list() {
        let p: Packet = "IN_PORT=3, VLAN_VID=None".parse().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"["IN_PORT=3","VLAN_VID=None"]"#);
        let back: Packet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
