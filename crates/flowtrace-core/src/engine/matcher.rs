// ── Flow table matcher ──
//
// Walks a device's multi-table pipeline for one packet. Tables are visited
// in go-to order from the lowest table id present; each table picks its
// highest-priority matching entry, and the first-inserted entry wins ties.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::actions;
use super::overlay::{HitContext, MissAction, MissContext, PipelineOverlay};
use crate::model::{
    Criterion, DeviceId, FlowEntry, GroupId, Instruction, Packet, PortNumber, TableId,
};

/// A forwarding decision leaving the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Output { port: PortNumber, packet: Packet },
    ToGroup { id: GroupId, packet: Packet },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No entry matched. `table` is where the miss happened, `None` when
    /// the device has no entries at all.
    NoMatch { table: Option<TableId> },
    Dropped { reason: String },
    Forward(Vec<Action>),
}

/// Everything one pipeline walk produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Entries hit, in table order.
    pub hits: Vec<FlowEntry>,
    /// Packet after every modification the pipeline applied.
    pub packet: Packet,
    pub verdict: Verdict,
}

/// Highest-priority entry of `table` matching `packet`.
pub fn highest_priority<'e>(
    entries: &'e [FlowEntry],
    table: TableId,
    packet: &Packet,
) -> Option<&'e FlowEntry> {
    let mut best: Option<&FlowEntry> = None;
    for entry in entries.iter().filter(|e| e.table == table) {
        if !entry.matches(packet) {
            continue;
        }
        if best.is_none_or(|b| entry.priority > b.priority) {
            best = Some(entry);
        }
    }
    best
}

/// Evaluates one device's pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FlowTableMatcher<'a> {
    device: &'a DeviceId,
    entries: &'a [FlowEntry],
    overlay: Option<&'a dyn PipelineOverlay>,
}

impl<'a> FlowTableMatcher<'a> {
    pub fn new(device: &'a DeviceId, entries: &'a [FlowEntry]) -> Self {
        Self {
            device,
            entries,
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Option<&'a dyn PipelineOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    fn stashes_eth_type(&self) -> bool {
        self.overlay.is_some_and(|o| o.stashes_eth_type())
    }

    /// Run `packet`, received on `in_port`, through the pipeline.
    ///
    /// The packet's IN_PORT is set to `in_port` before the first lookup.
    pub fn evaluate(&self, in_port: PortNumber, packet: &Packet) -> MatchOutcome {
        let outcome = self.walk(packet.with_criterion(Criterion::InPort(in_port)));
        match self.overlay {
            Some(overlay) => overlay.adjust_outcome(outcome),
            None => outcome,
        }
    }

    fn walk(&self, mut packet: Packet) -> MatchOutcome {
        let Some(mut table) = self.entries.iter().map(|e| e.table).min() else {
            debug!(device = %self.device, "device has no flow entries");
            return MatchOutcome {
                hits: Vec::new(),
                packet,
                verdict: Verdict::NoMatch { table: None },
            };
        };

        let stash = self.stashes_eth_type();
        let mut hits: Vec<FlowEntry> = Vec::new();
        let mut visited: BTreeSet<TableId> = BTreeSet::new();
        let mut immediate: Vec<Action> = Vec::new();
        let mut deferred: Vec<Instruction> = Vec::new();

        loop {
            if !visited.insert(table) {
                return MatchOutcome {
                    hits,
                    packet,
                    verdict: Verdict::Dropped {
                        reason: format!("Table loop at table {table} in device {}", self.device),
                    },
                };
            }

            let Some(entry) = highest_priority(self.entries, table, &packet) else {
                let ctx = MissContext {
                    table,
                    packet: &packet,
                    entries: self.entries,
                    hits: hits.len(),
                };
                let action = self
                    .overlay
                    .map_or(MissAction::NoMatch, |o| o.table_miss(&ctx));
                debug!(device = %self.device, %table, ?action, "table miss");
                match action {
                    MissAction::NoMatch => {
                        return MatchOutcome {
                            hits,
                            packet,
                            verdict: Verdict::NoMatch { table: Some(table) },
                        };
                    }
                    MissAction::Continue { next, packet: rewritten } => {
                        packet = rewritten;
                        table = next;
                        continue;
                    }
                    MissAction::EndPipeline => break,
                }
            };

            debug!(device = %self.device, %table, priority = entry.priority, "table hit");
            hits.push(entry.clone());

            for instruction in &entry.treatment.immediate {
                match *instruction {
                    Instruction::Drop => {
                        return MatchOutcome {
                            hits,
                            packet,
                            verdict: Verdict::Dropped {
                                reason: format!(
                                    "Packet dropped by flow at table {table} in device {}",
                                    self.device
                                ),
                            },
                        };
                    }
                    Instruction::Output { port } => immediate.push(Action::Output {
                        port,
                        packet: packet.clone(),
                    }),
                    Instruction::Group { id } => immediate.push(Action::ToGroup {
                        id,
                        packet: packet.clone(),
                    }),
                    _ => packet = actions::apply(&packet, instruction, stash),
                }
            }

            if entry.treatment.clear_deferred {
                deferred.clear();
            }
            deferred.extend(entry.treatment.deferred.iter().copied());

            if let Some(overlay) = self.overlay {
                let ctx = HitContext {
                    entry,
                    packet: &packet,
                    entries: self.entries,
                };
                match overlay.verify_hit(&ctx) {
                    Ok(Some(companion)) => hits.push(companion),
                    Ok(None) => {}
                    Err(reason) => {
                        return MatchOutcome {
                            hits,
                            packet,
                            verdict: Verdict::Dropped { reason },
                        };
                    }
                }
            }

            match entry.treatment.transition {
                Some(next) => table = next,
                None => break,
            }
        }

        self.finish(hits, packet, immediate, &deferred)
    }

    /// Apply the accumulated deferred set and settle the verdict.
    fn finish(
        &self,
        hits: Vec<FlowEntry>,
        mut packet: Packet,
        mut actions: Vec<Action>,
        deferred: &[Instruction],
    ) -> MatchOutcome {
        let stash = self.stashes_eth_type();
        let mut outputs: Vec<PortNumber> = Vec::new();
        let mut groups: Vec<GroupId> = Vec::new();
        for instruction in deferred {
            match *instruction {
                Instruction::Drop => {
                    return MatchOutcome {
                        hits,
                        packet,
                        verdict: Verdict::Dropped {
                            reason: format!("Packet dropped by write-actions in device {}", self.device),
                        },
                    };
                }
                Instruction::Output { port } => outputs.push(port),
                Instruction::Group { id } => groups.push(id),
                _ => packet = actions::apply(&packet, instruction, stash),
            }
        }

        // An action set holds a single output; it takes precedence over groups.
        if let Some(port) = outputs.last().copied() {
            if outputs.len() > 1 {
                warn!(device = %self.device, count = outputs.len(), "several deferred outputs, keeping the last");
            }
            actions.push(Action::Output {
                port,
                packet: packet.clone(),
            });
        } else {
            actions.extend(groups.into_iter().map(|id| Action::ToGroup {
                id,
                packet: packet.clone(),
            }));
        }

        let verdict = if actions.is_empty() {
            Verdict::Dropped {
                reason: format!("Packet has no output in device {}. Dropping", self.device),
            }
        } else {
            Verdict::Forward(actions)
        };
        MatchOutcome {
            hits,
            packet,
            verdict,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Treatment, VlanId};

    fn device() -> DeviceId {
        DeviceId::new("s1")
    }

    fn flow(table: u32, priority: u32, selector: &[&str], treatment: Treatment) -> FlowEntry {
        FlowEntry::new("s1", TableId(table), priority)
            .matching(selector.iter().map(|s| s.parse().unwrap()))
            .treating(treatment)
    }

    fn output(port: u64) -> Instruction {
        Instruction::Output {
            port: PortNumber::new(port),
        }
    }

    fn ports(outcome: &MatchOutcome) -> Vec<u64> {
        match &outcome.verdict {
            Verdict::Forward(actions) => actions
                .iter()
                .filter_map(|a| match a {
                    Action::Output { port, .. } => Some(port.as_u64()),
                    Action::ToGroup { .. } => None,
                })
                .collect(),
            other => panic!("expected forward, got {other:?}"),
        }
    }

    #[test]
    fn empty_device_is_no_match_without_table() {
        let id = device();
        let outcome = FlowTableMatcher::new(&id, &[]).evaluate(PortNumber::new(1), &Packet::new());
        assert_eq!(outcome.verdict, Verdict::NoMatch { table: None });
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn highest_priority_wins() {
        let id = device();
        let entries = vec![
            flow(0, 10, &[], Treatment::immediate([output(2)])),
            flow(0, 40000, &["ETH_TYPE=ipv4"], Treatment::immediate([output(3)])),
        ];
        let packet: Packet = "ETH_TYPE=ipv4".parse().unwrap();
        let outcome = FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &packet);
        assert_eq!(ports(&outcome), vec![3]);
    }

    #[test]
    fn equal_priority_keeps_first_inserted() {
        let id = device();
        let entries = vec![
            flow(0, 5, &["IN_PORT=1"], Treatment::immediate([output(7)])),
            flow(0, 5, &[], Treatment::immediate([output(8)])),
        ];
        let outcome =
            FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &Packet::new());
        assert_eq!(ports(&outcome), vec![7]);
    }

    #[test]
    fn generic_miss_reports_table() {
        let id = device();
        let entries = vec![flow(0, 1, &["ETH_TYPE=arp"], Treatment::immediate([output(1)]))];
        let packet: Packet = "ETH_TYPE=ipv4".parse().unwrap();
        let outcome = FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &packet);
        assert_eq!(outcome.verdict, Verdict::NoMatch { table: Some(TableId(0)) });
    }

    #[test]
    fn modifications_apply_before_later_output() {
        let id = device();
        let vlan = VlanId::new(100).unwrap();
        let entries = vec![flow(
            0,
            1,
            &[],
            Treatment::immediate([output(2), Instruction::PushVlan { vlan }, output(3)]),
        )];
        let outcome =
            FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &Packet::new());
        let Verdict::Forward(actions) = &outcome.verdict else {
            panic!("expected forward");
        };
        let vlans: Vec<Option<VlanId>> = actions
            .iter()
            .map(|a| match a {
                Action::Output { packet, .. } | Action::ToGroup { packet, .. } => packet.vlan(),
            })
            .collect();
        assert_eq!(vlans, vec![None, Some(vlan)]);
    }

    #[test]
    fn pipeline_follows_transitions_and_deferred_set() {
        let id = device();
        let vlan = VlanId::new(20).unwrap();
        let entries = vec![
            flow(
                0,
                1,
                &[],
                Treatment::immediate([Instruction::SetVlanId { vlan }]).with_transition(TableId(10)),
            ),
            flow(10, 1, &["VLAN_VID=20"], Treatment::default().with_deferred([output(9)]).with_transition(TableId(20))),
            flow(20, 1, &["VLAN_VID=20"], Treatment::default().with_deferred([output(4)])),
        ];
        let outcome =
            FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &Packet::new());
        assert_eq!(outcome.hits.len(), 3);
        assert_eq!(ports(&outcome), vec![4]);
        assert_eq!(outcome.packet.in_port(), Some(PortNumber::new(1)));
    }

    #[test]
    fn clear_deferred_discards_earlier_writes() {
        let id = device();
        let entries = vec![
            flow(0, 1, &[], Treatment::default().with_deferred([output(9)]).with_transition(TableId(5))),
            flow(5, 1, &[], Treatment::default().with_clear_deferred()),
        ];
        let outcome =
            FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &Packet::new());
        assert!(matches!(outcome.verdict, Verdict::Dropped { ref reason } if reason.contains("no output")));
    }

    #[test]
    fn drop_instruction_stops_pipeline() {
        let id = device();
        let entries = vec![flow(0, 1, &[], Treatment::immediate([Instruction::Drop, output(2)]))];
        let outcome =
            FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &Packet::new());
        assert!(matches!(outcome.verdict, Verdict::Dropped { .. }));
    }

    #[test]
    fn goto_loop_is_dropped() {
        let id = device();
        let entries = vec![
            flow(0, 1, &[], Treatment::default().with_transition(TableId(1))),
            flow(1, 1, &[], Treatment::default().with_transition(TableId(0))),
        ];
        let outcome =
            FlowTableMatcher::new(&id, &entries).evaluate(PortNumber::new(1), &Packet::new());
        assert!(matches!(outcome.verdict, Verdict::Dropped { ref reason } if reason.starts_with("Table loop")));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let id = device();
        let entries = vec![
            flow(0, 3, &["ETH_TYPE=ipv4"], Treatment::immediate([Instruction::Group { id: GroupId(1) }])),
            flow(0, 3, &[], Treatment::immediate([output(2)])),
        ];
        let packet: Packet = "ETH_TYPE=ipv4, IPV4_DST=10.0.0.1/32".parse().unwrap();
        let matcher = FlowTableMatcher::new(&id, &entries);
        assert_eq!(
            matcher.evaluate(PortNumber::new(1), &packet),
            matcher.evaluate(PortNumber::new(1), &packet)
        );
    }
}
