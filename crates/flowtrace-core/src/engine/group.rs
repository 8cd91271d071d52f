// ── Group resolver ──
//
// Expands a group reference into the concrete (port, packet) pairs its
// buckets produce. Nested groups recurse; the chain of groups on the
// current recursion path doubles as the per-device visited set.

use tracing::{debug, warn};

use super::actions;
use super::overlay::PipelineOverlay;
use crate::model::{
    Bucket, ConnectPoint, DeviceId, Group, GroupId, GroupType, Instruction, Packet, PortNumber,
};

/// A port a group sends the packet to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    pub port: PortNumber,
    pub packet: Packet,
    /// Groups traversed to reach this output, outermost first.
    pub groups: Vec<GroupId>,
    /// Produced by a select or fast-failover bucket: one of several
    /// candidates rather than a copy sent alongside its siblings.
    pub alternative: bool,
}

/// A bucket or group that produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupFailure {
    InvalidGroup {
        id: GroupId,
        chain: Vec<GroupId>,
    },
    EmptyGroup {
        id: GroupId,
        chain: Vec<GroupId>,
    },
    GroupLoop {
        id: GroupId,
        chain: Vec<GroupId>,
    },
    DroppedBucket {
        group: GroupId,
        bucket: usize,
        reason: String,
        packet: Packet,
        chain: Vec<GroupId>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub outputs: Vec<ResolvedOutput>,
    pub failures: Vec<GroupFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupResolver<'a> {
    device: &'a DeviceId,
    groups: &'a [Group],
    overlay: Option<&'a dyn PipelineOverlay>,
    ingress: &'a ConnectPoint,
}

impl<'a> GroupResolver<'a> {
    pub fn new(device: &'a DeviceId, groups: &'a [Group], ingress: &'a ConnectPoint) -> Self {
        Self {
            device,
            groups,
            overlay: None,
            ingress,
        }
    }

    pub fn with_overlay(mut self, overlay: Option<&'a dyn PipelineOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn resolve(&self, id: GroupId, packet: &Packet) -> Resolution {
        let mut resolution = Resolution::default();
        self.expand(id, packet, &mut Vec::new(), false, &mut resolution);
        resolution
    }

    fn expand(
        &self,
        id: GroupId,
        packet: &Packet,
        chain: &mut Vec<GroupId>,
        alternative: bool,
        out: &mut Resolution,
    ) {
        if chain.contains(&id) {
            warn!(device = %self.device, group = %id, "group loop");
            out.failures.push(GroupFailure::GroupLoop {
                id,
                chain: chain.clone(),
            });
            return;
        }
        let Some(group) = self.groups.iter().find(|g| g.id == id) else {
            out.failures.push(GroupFailure::InvalidGroup {
                id,
                chain: chain.clone(),
            });
            return;
        };
        chain.push(id);
        debug!(device = %self.device, group = %id, kind = %group.group_type, buckets = group.buckets.len(), "resolving group");

        if group.buckets.is_empty() {
            out.failures.push(GroupFailure::EmptyGroup {
                id,
                chain: chain.clone(),
            });
        } else {
            let buckets: &[Bucket] = match group.group_type {
                GroupType::Indirect => {
                    if group.buckets.len() > 1 {
                        warn!(device = %self.device, group = %id, "indirect group with several buckets, using the first");
                    }
                    &group.buckets[..1]
                }
                GroupType::All | GroupType::Select | GroupType::FastFailover => &group.buckets,
            };
            let alternative = alternative
                || (matches!(group.group_type, GroupType::Select | GroupType::FastFailover)
                    && group.buckets.len() > 1);
            for (index, bucket) in buckets.iter().enumerate() {
                self.apply_bucket(group, index, bucket, packet, chain, alternative, out);
            }
        }

        chain.pop();
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_bucket(
        &self,
        group: &Group,
        index: usize,
        bucket: &Bucket,
        packet: &Packet,
        chain: &mut Vec<GroupId>,
        alternative: bool,
        out: &mut Resolution,
    ) {
        let dropped = |reason: String, packet: Packet, chain: &[GroupId]| GroupFailure::DroppedBucket {
            group: group.id,
            bucket: index,
            reason,
            packet,
            chain: chain.to_vec(),
        };

        if self
            .overlay
            .is_some_and(|o| o.drops_bucket(group, bucket, self.ingress))
        {
            out.failures.push(dropped(
                format!("Bucket points back to ingress port {}", self.ingress),
                packet.clone(),
                chain.as_slice(),
            ));
            return;
        }

        let stash = self.overlay.is_some_and(|o| o.stashes_eth_type());
        let mut rewritten = packet.clone();
        let mut ports: Vec<PortNumber> = Vec::new();
        let mut nested: Vec<GroupId> = Vec::new();
        for instruction in &bucket.instructions {
            match *instruction {
                Instruction::Drop => {
                    out.failures.push(dropped(
                        format!("Bucket {index} of group {} drops the packet", group.id),
                        rewritten,
                        chain.as_slice(),
                    ));
                    return;
                }
                Instruction::Output { port } => ports.push(port),
                Instruction::Group { id } => nested.push(id),
                _ => rewritten = actions::apply(&rewritten, instruction, stash),
            }
        }

        if ports.is_empty() && nested.is_empty() {
            out.failures.push(dropped(
                format!("Bucket {index} of group {} has no output", group.id),
                rewritten,
                chain.as_slice(),
            ));
            return;
        }

        out.outputs.extend(ports.into_iter().map(|port| ResolvedOutput {
            port,
            packet: rewritten.clone(),
            groups: chain.clone(),
            alternative,
        }));
        for id in nested {
            self.expand(id, &rewritten, chain, alternative, out);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::ofdpa::OfdpaOverlay;
    use crate::model::{MacAddress, VlanId};

    fn output(port: u64) -> Instruction {
        Instruction::Output {
            port: PortNumber::new(port),
        }
    }

    fn group_ref(id: u32) -> Instruction {
        Instruction::Group { id: GroupId(id) }
    }

    fn ingress() -> ConnectPoint {
        ConnectPoint::new("s1", PortNumber::new(1))
    }

    #[test]
    fn all_group_yields_one_output_per_bucket() {
        let device = DeviceId::new("s1");
        let groups = vec![
            Group::new("s1", GroupId(1), GroupType::All)
                .with_bucket(Bucket::new([output(2)]))
                .with_bucket(Bucket::new([output(3)]))
                .with_bucket(Bucket::new([output(4)])),
        ];
        let cp = ingress();
        let resolution = GroupResolver::new(&device, &groups, &cp).resolve(GroupId(1), &Packet::new());
        let ports: Vec<u64> = resolution.outputs.iter().map(|o| o.port.as_u64()).collect();
        assert_eq!(ports, vec![2, 3, 4]);
        assert!(resolution.outputs.iter().all(|o| !o.alternative));
        assert!(resolution.failures.is_empty());
    }

    #[test]
    fn buckets_rewrite_independently() {
        let device = DeviceId::new("s1");
        let mac: MacAddress = "00:00:00:00:00:aa".parse().unwrap();
        let groups = vec![
            Group::new("s1", GroupId(1), GroupType::All)
                .with_bucket(Bucket::new([Instruction::SetEthDst { mac }, output(2)]))
                .with_bucket(Bucket::new([output(3)])),
        ];
        let cp = ingress();
        let resolution = GroupResolver::new(&device, &groups, &cp).resolve(GroupId(1), &Packet::new());
        assert_eq!(resolution.outputs[0].packet.eth_dst(), Some(mac));
        assert_eq!(resolution.outputs[1].packet.eth_dst(), None);
    }

    #[test]
    fn nested_groups_record_chain() {
        let device = DeviceId::new("s1");
        let vlan = VlanId::new(30).unwrap();
        let groups = vec![
            Group::new("s1", GroupId(0x2000_0001), GroupType::Indirect)
                .with_bucket(Bucket::new([Instruction::SetVlanId { vlan }, group_ref(7)])),
            Group::new("s1", GroupId(7), GroupType::Indirect).with_bucket(Bucket::new([output(5)])),
        ];
        let cp = ingress();
        let resolution =
            GroupResolver::new(&device, &groups, &cp).resolve(GroupId(0x2000_0001), &Packet::new());
        assert_eq!(resolution.outputs.len(), 1);
        let out = &resolution.outputs[0];
        assert_eq!(out.groups, vec![GroupId(0x2000_0001), GroupId(7)]);
        assert_eq!(out.packet.vlan(), Some(vlan));
    }

    #[test]
    fn select_buckets_are_alternatives() {
        let device = DeviceId::new("s1");
        let groups = vec![
            Group::new("s1", GroupId(9), GroupType::Select)
                .with_bucket(Bucket::new([output(2)]))
                .with_bucket(Bucket::new([output(3)])),
        ];
        let cp = ingress();
        let resolution = GroupResolver::new(&device, &groups, &cp).resolve(GroupId(9), &Packet::new());
        assert_eq!(resolution.outputs.len(), 2);
        assert!(resolution.outputs.iter().all(|o| o.alternative));
    }

    #[test]
    fn failures_are_annotated_not_fatal() {
        let device = DeviceId::new("s1");
        let groups = vec![
            Group::new("s1", GroupId(1), GroupType::All)
                .with_bucket(Bucket::new([group_ref(404)]))
                .with_bucket(Bucket::new([group_ref(2)]))
                .with_bucket(Bucket::new([group_ref(1)]))
                .with_bucket(Bucket::new([Instruction::PopVlan]))
                .with_bucket(Bucket::new([output(8)])),
            Group::new("s1", GroupId(2), GroupType::All),
        ];
        let cp = ingress();
        let resolution = GroupResolver::new(&device, &groups, &cp).resolve(GroupId(1), &Packet::new());
        assert_eq!(resolution.outputs.len(), 1);
        assert!(matches!(resolution.failures[0], GroupFailure::InvalidGroup { id: GroupId(404), .. }));
        assert!(matches!(resolution.failures[1], GroupFailure::EmptyGroup { id: GroupId(2), .. }));
        assert!(matches!(resolution.failures[2], GroupFailure::GroupLoop { id: GroupId(1), .. }));
        assert!(matches!(resolution.failures[3], GroupFailure::DroppedBucket { bucket: 3, .. }));
    }

    #[test]
    fn unknown_group_is_invalid() {
        let device = DeviceId::new("s1");
        let cp = ingress();
        let resolution = GroupResolver::new(&device, &[], &cp).resolve(GroupId(3), &Packet::new());
        assert!(resolution.outputs.is_empty());
        assert_eq!(
            resolution.failures,
            vec![GroupFailure::InvalidGroup {
                id: GroupId(3),
                chain: Vec::new()
            }]
        );
    }

    #[test]
    fn ofdpa_flood_skips_ingress_interface() {
        let device = DeviceId::new("leaf1");
        let groups = vec![
            Group::new("leaf1", GroupId(0x4014_0000), GroupType::All)
                .with_bucket(Bucket::new([group_ref(0x0014_0001)]))
                .with_bucket(Bucket::new([group_ref(0x0014_0002)])),
            Group::new("leaf1", GroupId(0x0014_0001), GroupType::Indirect)
                .with_bucket(Bucket::new([Instruction::PopVlan, output(1)])),
            Group::new("leaf1", GroupId(0x0014_0002), GroupType::Indirect)
                .with_bucket(Bucket::new([Instruction::PopVlan, output(2)])),
        ];
        let cp = ConnectPoint::new("leaf1", PortNumber::new(1));
        let overlay = OfdpaOverlay::hardware();
        let resolution = GroupResolver::new(&device, &groups, &cp)
            .with_overlay(Some(&overlay as &dyn PipelineOverlay))
            .resolve(GroupId(0x4014_0000), &Packet::new());
        let ports: Vec<u64> = resolution.outputs.iter().map(|o| o.port.as_u64()).collect();
        assert_eq!(ports, vec![2]);
        assert_eq!(resolution.failures.len(), 1);
    }
}
