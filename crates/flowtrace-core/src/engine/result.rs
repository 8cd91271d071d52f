// ── Trace results ──
//
// A `StaticPacketTrace` is assembled by a `TraceBuilder` while branches
// run, then frozen. Build sorts every collection canonically, so the
// result does not depend on the order in which branches were explored.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::walker::DeadEndReason;
use crate::model::{ConnectPoint, DeviceId, FlowEntry, GroupId, HostId, Packet, TableId};

/// One packet leaving one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopOutput {
    pub egress: ConnectPoint,
    pub packet: Packet,
    /// Groups the packet went through, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupId>,
    /// One of several select or fast-failover candidates.
    pub alternative: bool,
    /// The output exists in the tables but the packet does not leave.
    pub dropped: bool,
}

impl HopOutput {
    fn sort_key(&self) -> (ConnectPoint, String, Vec<GroupId>, bool, bool) {
        (
            self.egress.clone(),
            self.packet.to_string(),
            self.groups.clone(),
            self.alternative,
            self.dropped,
        )
    }
}

/// Flow entries a packet hit inside one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitChain {
    pub ingress: ConnectPoint,
    pub flows: Vec<FlowEntry>,
}

/// How a reached host relates to the required destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reach {
    /// A required destination host.
    Destination,
    /// A host, but not a required one.
    WrongHost,
    /// No destination was known to compare against.
    Unconstrained,
}

/// How one branch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BranchOutcome {
    ReachedHost {
        egress: ConnectPoint,
        hosts: Vec<HostId>,
        reach: Reach,
    },
    ToController {
        egress: ConnectPoint,
    },
    DeadEnd {
        egress: ConnectPoint,
        reason: DeadEndReason,
    },
    LoopDetected {
        at: ConnectPoint,
    },
    NoMatch {
        device: DeviceId,
        table: Option<TableId>,
    },
    Dropped {
        device: DeviceId,
        reason: String,
    },
    InvalidGroup {
        device: DeviceId,
        group: GroupId,
    },
    EmptyGroup {
        device: DeviceId,
        group: GroupId,
    },
    GroupLoop {
        device: DeviceId,
        group: GroupId,
    },
    DeviceOffline {
        device: DeviceId,
    },
    UnknownDevice {
        device: DeviceId,
    },
    OutputToIngress {
        egress: ConnectPoint,
    },
}

impl BranchOutcome {
    /// Whether the branch delivered the packet to an end host.
    pub fn reached_host(&self) -> bool {
        matches!(self, Self::ReachedHost { .. })
    }

    /// Short name of the outcome, as used in the serialized `outcome` tag.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReachedHost { .. } => "reached_host",
            Self::ToController { .. } => "to_controller",
            Self::DeadEnd { .. } => "dead_end",
            Self::LoopDetected { .. } => "loop_detected",
            Self::NoMatch { .. } => "no_match",
            Self::Dropped { .. } => "dropped",
            Self::InvalidGroup { .. } => "invalid_group",
            Self::EmptyGroup { .. } => "empty_group",
            Self::GroupLoop { .. } => "group_loop",
            Self::DeviceOffline { .. } => "device_offline",
            Self::UnknownDevice { .. } => "unknown_device",
            Self::OutputToIngress { .. } => "output_to_ingress",
        }
    }

    /// Human-readable description; `packet` is the packet at the end of
    /// the branch.
    pub fn message(&self, packet: &Packet) -> String {
        match self {
            Self::ReachedHost {
                egress,
                hosts,
                reach,
            } => match reach {
                Reach::Destination => format!("Reached required destination Host {egress}"),
                Reach::WrongHost => format!(
                    "Wrong output {egress} for required destination, reached hosts {}",
                    join(hosts)
                ),
                Reach::Unconstrained => format!(
                    "Packet is {} and reached {egress} with hosts {}",
                    eth_type_name(packet),
                    join(hosts)
                ),
            },
            Self::ToController { egress } => {
                format!("Packet goes to the controller from {egress}")
            }
            Self::DeadEnd { egress, reason } => match reason {
                DeadEndReason::NoLinks => {
                    format!("No links depart from {egress}. Packet is dropped")
                }
                DeadEndReason::PortMissing => {
                    format!("Port {egress} is not available on device. Packet is dropped")
                }
                DeadEndReason::PortDisabled => {
                    format!("Port {egress} is disabled. Packet is dropped")
                }
            },
            Self::LoopDetected { at } => format!("Loop detected at {at}. Packet is dropped"),
            Self::NoMatch { device, table } => match table {
                Some(table) => {
                    format!("Packet has no match on table {table} in device {device}. Dropping")
                }
                None => format!("No flow rules for device {device}. Aborting"),
            },
            Self::Dropped { reason, .. } => reason.clone(),
            Self::InvalidGroup { device, group } => {
                format!("Null group for Instruction {group} in device {device}")
            }
            Self::EmptyGroup { group, .. } => format!("Group {group} has no buckets"),
            Self::GroupLoop { device, group } => {
                format!("Group loop through group {group} in device {device}")
            }
            Self::DeviceOffline { device } => format!("Device is offline {device}"),
            Self::UnknownDevice { device } => format!("Device {device} is not known"),
            Self::OutputToIngress { egress } => {
                format!("Connect point out {egress} is same as initial input in")
            }
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", inner.join(", "))
}

fn eth_type_name(packet: &Packet) -> String {
    match packet.eth_type() {
        Some(value) => crate::model::ether_type::name_of(value)
            .map_or_else(|| format!("{value:#06x}"), str::to_uppercase),
        None => "untyped".to_owned(),
    }
}

/// One branch from the ingress to its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TracePath {
    /// Connect points in order: ingress, egress, next ingress, ...
    pub hops: Vec<ConnectPoint>,
    /// The packet as it was when the branch ended.
    pub packet: Packet,
    #[serde(flatten)]
    pub outcome: BranchOutcome,
}

impl TracePath {
    pub fn message(&self) -> String {
        self.outcome.message(&self.packet)
    }
}

/// The complete result of one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaticPacketTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_packet: Option<Packet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<ConnectPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<HostId>,
    /// Hosts the packet is addressed to, derived from its headers when no
    /// expected host was given.
    pub destinations: Vec<HostId>,
    /// Source and destination of a host-to-host trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<(HostId, HostId)>,
    pub hop_outputs: BTreeMap<DeviceId, Vec<HopOutput>>,
    pub hit_chains: BTreeMap<DeviceId, Vec<HitChain>>,
    pub paths: Vec<TracePath>,
    pub success: bool,
    pub messages: Vec<String>,
}

impl StaticPacketTrace {
    /// A trace that could not be started, carrying only its reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
            ..Self::default()
        }
    }

    /// Paths that ended at a host.
    pub fn complete_paths(&self) -> impl Iterator<Item = &TracePath> {
        self.paths.iter().filter(|p| p.outcome.reached_host())
    }

    /// Number of branches the trace explored.
    pub fn branch_count(&self) -> usize {
        self.paths.len()
    }

    pub fn with_endpoints(mut self, src: HostId, dst: HostId) -> Self {
        self.endpoints = Some((src, dst));
        self
    }
}

/// Mutable accumulator for one trace call.
#[derive(Debug)]
pub struct TraceBuilder {
    trace: StaticPacketTrace,
}

impl TraceBuilder {
    pub fn new(
        packet: Packet,
        ingress: ConnectPoint,
        expected: Option<HostId>,
        destinations: Vec<HostId>,
    ) -> Self {
        Self {
            trace: StaticPacketTrace {
                initial_packet: Some(packet),
                ingress: Some(ingress),
                expected,
                destinations,
                ..StaticPacketTrace::default()
            },
        }
    }

    pub fn record_hop(&mut self, device: &DeviceId, output: HopOutput) {
        self.trace
            .hop_outputs
            .entry(device.clone())
            .or_default()
            .push(output);
    }

    pub fn record_hits(&mut self, device: &DeviceId, chain: HitChain) {
        self.trace
            .hit_chains
            .entry(device.clone())
            .or_default()
            .push(chain);
    }

    pub fn finish_path(&mut self, path: TracePath) {
        self.trace.paths.push(path);
    }

    pub fn build(self) -> StaticPacketTrace {
        let Self { mut trace } = self;

        // One hop output and one path per branch, even when branches agree.
        for outputs in trace.hop_outputs.values_mut() {
            outputs.sort_by_cached_key(HopOutput::sort_key);
        }
        for chains in trace.hit_chains.values_mut() {
            chains.sort_by_cached_key(|c| {
                let flows: Vec<String> = c.flows.iter().map(ToString::to_string).collect();
                (c.ingress.clone(), flows)
            });
            chains.dedup();
        }
        trace
            .paths
            .sort_by_cached_key(|p| (p.hops.clone(), p.packet.to_string(), p.message()));

        trace.success = if trace.expected.is_some() {
            trace.paths.iter().any(|p| {
                matches!(
                    p.outcome,
                    BranchOutcome::ReachedHost {
                        reach: Reach::Destination,
                        ..
                    }
                )
            })
        } else {
            trace.paths.iter().any(|p| p.outcome.reached_host())
        };

        let mut messages: Vec<String> = trace.paths.iter().map(TracePath::message).collect();
        let mut seen = std::collections::BTreeSet::new();
        messages.retain(|m| seen.insert(m.clone()));
        trace.messages = messages;
        trace
    }
}
