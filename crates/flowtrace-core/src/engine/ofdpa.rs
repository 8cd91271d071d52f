// ── OF-DPA pipeline overlay ──
//
// Table layout and group-id encoding of the OpenFlow Data Plane
// Abstraction. On switching hardware a table-miss usually continues
// rather than drops, table 27 is a fixed stage that pops MPLS, and the
// VLAN table needs a pair of entries to tag an untagged packet.

use tracing::debug;

use super::actions;
use super::matcher::highest_priority;
use super::overlay::{HitContext, MissAction, MissContext, PipelineOverlay};
use crate::model::{
    Bucket, ConnectPoint, Criterion, CriterionType, FlowEntry, Group, Instruction, TableId,
    ether_type,
};

pub const PORT_TABLE: TableId = TableId(0);
pub const VLAN_TABLE: TableId = TableId(10);
pub const TMAC_TABLE: TableId = TableId(20);
pub const MPLS_L3_TYPE_TABLE: TableId = TableId(27);
pub const UNICAST_ROUTING_TABLE: TableId = TableId(30);
pub const MULTICAST_ROUTING_TABLE: TableId = TableId(40);
pub const BRIDGING_TABLE: TableId = TableId(50);
pub const ACL_TABLE: TableId = TableId(60);

/// Group type lives in the top nibble of an OF-DPA group id.
pub const GROUP_TYPE_MASK: u32 = 0xF000_0000;
pub const L2_INTERFACE_TYPE: u32 = 0x0000_0000;
pub const L2_MULTICAST_TYPE: u32 = 0x3000_0000;
pub const L2_FLOOD_TYPE: u32 = 0x4000_0000;
pub const L3_MULTICAST_TYPE: u32 = 0x6000_0000;
/// An L2 interface group carries its port in the low 16 bits.
pub const L2_INTERFACE_PORT_MASK: u32 = 0x0000_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct OfdpaOverlay {
    hardware: bool,
}

impl OfdpaOverlay {
    pub fn hardware() -> Self {
        Self { hardware: true }
    }

    /// Software OF-DPA: logical table semantics, hardware group rules.
    pub fn virtual_switch() -> Self {
        Self { hardware: false }
    }

    /// Smallest table id present that is strictly greater than `after`.
    fn next_table(entries: &[FlowEntry], after: TableId) -> Option<TableId> {
        entries.iter().map(|e| e.table).filter(|t| *t > after).min()
    }
}

impl PipelineOverlay for OfdpaOverlay {
    fn name(&self) -> &'static str {
        if self.hardware { "ofdpa" } else { "ofdpa-ovs" }
    }

    fn table_miss(&self, ctx: &MissContext<'_>) -> MissAction {
        if !self.hardware {
            return MissAction::NoMatch;
        }

        let mut packet = ctx.packet.clone();
        let mut search_from = ctx.table;
        if ctx.table == MPLS_L3_TYPE_TABLE {
            // Fixed stage: pop the label and resume at ACL.
            if packet.eth_type() == Some(ether_type::MPLS_UNICAST) {
                if let Some(stashed) = packet.metadata().and_then(|m| u16::try_from(m).ok()) {
                    debug!(eth_type = stashed, "table 27 pops MPLS");
                    packet = actions::apply(
                        &packet.without(&[CriterionType::Metadata]),
                        &Instruction::PopMpls { eth_type: stashed },
                        false,
                    );
                }
            }
            search_from = TableId(ACL_TABLE.0 - 1);
        }

        let Some(next) = Self::next_table(ctx.entries, search_from) else {
            return if ctx.hits == 0 {
                MissAction::NoMatch
            } else {
                MissAction::EndPipeline
            };
        };

        let next = match ctx.table {
            TMAC_TABLE => BRIDGING_TABLE,
            MULTICAST_ROUTING_TABLE => ACL_TABLE,
            _ => next,
        };
        debug!(from = %ctx.table, to = %next, "table miss continues");
        MissAction::Continue { next, packet }
    }

    fn verify_hit(&self, ctx: &HitContext<'_>) -> Result<Option<FlowEntry>, String> {
        let entry = ctx.entry;
        let untagged_rule = entry
            .selector
            .iter()
            .any(|c| matches!(c, Criterion::VlanVid(v) if v.is_none()));
        if !self.hardware || entry.table != VLAN_TABLE || !untagged_rule {
            return Ok(None);
        }

        let assigned = entry.treatment.immediate.iter().find_map(|i| match i {
            Instruction::SetVlanId { vlan } | Instruction::PushVlan { vlan } => Some(*vlan),
            _ => None,
        });
        let Some(assigned) = assigned else {
            return Ok(None);
        };

        // The companion entry matches the freshly assigned VLAN.
        let companion = (ctx.packet.vlan() == Some(assigned))
            .then(|| {
                let tagged: Vec<FlowEntry> = ctx
                    .entries
                    .iter()
                    .filter(|e| {
                        e.table == VLAN_TABLE
                            && e.selector.contains(&Criterion::VlanVid(assigned))
                    })
                    .cloned()
                    .collect();
                highest_priority(&tagged, VLAN_TABLE, ctx.packet).cloned()
            })
            .flatten();

        match companion {
            Some(found) => Ok(Some(found)),
            None => Err(format!(
                "Missing forwarding rule for tagged packet on {}",
                entry.device
            )),
        }
    }

    fn drops_bucket(&self, group: &Group, bucket: &Bucket, ingress: &ConnectPoint) -> bool {
        let group_type = group.id.0 & GROUP_TYPE_MASK;
        if ![L2_FLOOD_TYPE, L2_MULTICAST_TYPE, L3_MULTICAST_TYPE].contains(&group_type) {
            return false;
        }
        bucket
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::Group { id } if id.0 & GROUP_TYPE_MASK == L2_INTERFACE_TYPE => {
                    Some(u64::from(id.0 & L2_INTERFACE_PORT_MASK) == ingress.port.as_u64())
                }
                _ => None,
            })
            .unwrap_or(false)
    }

    fn stashes_eth_type(&self) -> bool {
        self.hardware
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{GroupId, GroupType, Packet, PortNumber, Treatment, VlanId};

    fn flow(table: TableId, priority: u32, selector: &[&str]) -> FlowEntry {
        FlowEntry::new("leaf1", table, priority)
            .matching(selector.iter().map(|s| s.parse().unwrap()))
    }

    #[test]
    fn tmac_miss_skips_to_bridging() {
        let entries = vec![
            flow(VLAN_TABLE, 1, &[]),
            flow(TMAC_TABLE, 1, &["ETH_TYPE=ipv4"]),
            flow(UNICAST_ROUTING_TABLE, 1, &[]),
            flow(BRIDGING_TABLE, 1, &[]),
        ];
        let packet: Packet = "ETH_TYPE=arp".parse().unwrap();
        let ctx = MissContext {
            table: TMAC_TABLE,
            packet: &packet,
            entries: &entries,
            hits: 1,
        };
        assert_eq!(
            OfdpaOverlay::hardware().table_miss(&ctx),
            MissAction::Continue {
                next: BRIDGING_TABLE,
                packet: packet.clone()
            }
        );
        assert_eq!(OfdpaOverlay::virtual_switch().table_miss(&ctx), MissAction::NoMatch);
    }

    #[test]
    fn table_27_miss_pops_mpls_from_metadata() {
        let entries = vec![flow(MPLS_L3_TYPE_TABLE, 1, &["MPLS_LABEL=1"]), flow(ACL_TABLE, 1, &[])];
        let packet: Packet = "ETH_TYPE=mpls_unicast, MPLS_LABEL=204, MPLS_BOS=true, METADATA=0x800"
            .parse()
            .unwrap();
        let ctx = MissContext {
            table: MPLS_L3_TYPE_TABLE,
            packet: &packet,
            entries: &entries,
            hits: 2,
        };
        let expected: Packet = "ETH_TYPE=ipv4".parse().unwrap();
        assert_eq!(
            OfdpaOverlay::hardware().table_miss(&ctx),
            MissAction::Continue {
                next: ACL_TABLE,
                packet: expected
            }
        );
    }

    #[test]
    fn miss_on_last_table_ends_pipeline_after_hits() {
        let entries = vec![flow(ACL_TABLE, 1, &["ETH_TYPE=lldp"])];
        let packet = Packet::new();
        let mut ctx = MissContext {
            table: ACL_TABLE,
            packet: &packet,
            entries: &entries,
            hits: 3,
        };
        assert_eq!(OfdpaOverlay::hardware().table_miss(&ctx), MissAction::EndPipeline);
        ctx.hits = 0;
        assert_eq!(OfdpaOverlay::hardware().table_miss(&ctx), MissAction::NoMatch);
    }

    #[test]
    fn vlan_assignment_requires_companion_entry() {
        let assign = flow(VLAN_TABLE, 10, &["IN_PORT=1", "VLAN_VID=None"]).treating(
            Treatment::immediate([Instruction::SetVlanId {
                vlan: VlanId::new(20).unwrap(),
            }])
            .with_transition(TMAC_TABLE),
        );
        let companion = flow(VLAN_TABLE, 10, &["IN_PORT=1", "VLAN_VID=20"])
            .treating(Treatment::default().with_transition(TMAC_TABLE));
        let tagged: Packet = "IN_PORT=1, VLAN_VID=20".parse().unwrap();

        let alone = [assign.clone()];
        let ctx = HitContext {
            entry: &assign,
            packet: &tagged,
            entries: &alone,
        };
        let err = OfdpaOverlay::hardware().verify_hit(&ctx).unwrap_err();
        assert!(err.starts_with("Missing forwarding rule for tagged packet"));

        let both = [assign.clone(), companion.clone()];
        let ctx = HitContext {
            entry: &assign,
            packet: &tagged,
            entries: &both,
        };
        assert_eq!(OfdpaOverlay::hardware().verify_hit(&ctx).unwrap(), Some(companion));
        assert_eq!(OfdpaOverlay::virtual_switch().verify_hit(&ctx).unwrap(), None);
    }

    #[test]
    fn flood_bucket_back_to_ingress_is_dropped() {
        let flood = Group::new("leaf1", GroupId(0x4014_0000), GroupType::All);
        let to_port_3 = Bucket::new([Instruction::Group {
            id: GroupId(0x0014_0003),
        }]);
        let to_port_4 = Bucket::new([Instruction::Group {
            id: GroupId(0x0014_0004),
        }]);
        let ingress = ConnectPoint::new("leaf1", PortNumber::new(3));
        let overlay = OfdpaOverlay::hardware();
        assert!(overlay.drops_bucket(&flood, &to_port_3, &ingress));
        assert!(!overlay.drops_bucket(&flood, &to_port_4, &ingress));

        let l3_unicast = Group::new("leaf1", GroupId(0x2000_0001), GroupType::Indirect);
        assert!(!overlay.drops_bucket(&l3_unicast, &to_port_3, &ingress));
    }
}
