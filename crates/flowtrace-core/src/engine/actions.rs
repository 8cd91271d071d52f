// ── Header rewrites ──

use crate::model::{Criterion, CriterionType, Instruction, Packet, VlanId};

/// Apply one header modification to `packet`.
///
/// Terminal instructions (`Output`, `Group`, `Drop`) leave the packet
/// unchanged. With `stash_eth_type`, an MPLS push records the replaced
/// Ethernet type in METADATA so a later pop can restore it.
pub(crate) fn apply(packet: &Packet, instruction: &Instruction, stash_eth_type: bool) -> Packet {
    match *instruction {
        Instruction::SetVlanId { vlan } | Instruction::PushVlan { vlan } => {
            packet.with_criterion(Criterion::VlanVid(vlan))
        }
        Instruction::PopVlan => packet.with_criterion(Criterion::VlanVid(VlanId::NONE)),
        Instruction::SetEthSrc { mac } => packet
            .without(&[CriterionType::EthSrcMasked])
            .with_criterion(Criterion::EthSrc(mac)),
        Instruction::SetEthDst { mac } => packet
            .without(&[CriterionType::EthDstMasked])
            .with_criterion(Criterion::EthDst(mac)),
        Instruction::PushMpls { eth_type } => {
            let base = match packet.eth_type() {
                Some(previous) if stash_eth_type => {
                    packet.with_criterion(Criterion::Metadata(u64::from(previous)))
                }
                _ => packet.clone(),
            };
            base.with_criterion(Criterion::EthType(eth_type))
        }
        Instruction::PopMpls { eth_type } => packet
            .without(&[CriterionType::MplsLabel, CriterionType::MplsBos])
            .with_criterion(Criterion::EthType(eth_type)),
        Instruction::SetMplsLabel { label } => packet
            .with_criterion(Criterion::MplsLabel(label))
            .with_criterion(Criterion::MplsBos(true)),
        Instruction::Output { .. } | Instruction::Group { .. } | Instruction::Drop => packet.clone(),
    }
}
