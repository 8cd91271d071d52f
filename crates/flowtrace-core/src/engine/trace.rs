// ── Trace orchestrator ──
//
// Drives a packet through the network. Every (packet, ingress) pair still
// to be evaluated is a frame on an explicit work stack; a frame carries
// the connect points its branch has visited and the path it took, so
// forked branches never share mutable state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::group::{GroupFailure, GroupResolver};
use super::matcher::{Action, FlowTableMatcher, MatchOutcome, Verdict};
use super::overlay::OverlayRegistry;
use super::result::{
    BranchOutcome, HitChain, HopOutput, Reach, StaticPacketTrace, TraceBuilder, TracePath,
};
use super::walker::{NextHop, TopologyWalker};
use crate::error::TraceError;
use crate::model::{
    ConnectPoint, Criterion, CriterionType, Device, DeviceId, GroupId, Host, HostId, Packet,
    PortNumber, VlanId, ether_type,
};
use crate::providers::NetworkView;

/// Where the required destination comes from when no host is expected.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationPolicy {
    /// Hosts owning the packet's destination IP or MAC.
    #[default]
    Derive,
    /// No destination: reaching any host is a success.
    AnyHost,
}

/// Static packet tracer over a read-only network view.
#[derive(Debug)]
pub struct Tracer<'v, V: NetworkView + ?Sized> {
    pub(crate) view: &'v V,
    overlays: &'v OverlayRegistry,
    policy: DestinationPolicy,
}

impl<V: NetworkView + ?Sized> Clone for Tracer<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: NetworkView + ?Sized> Copy for Tracer<'_, V> {}

impl<'v, V: NetworkView + ?Sized> Tracer<'v, V> {
    pub fn new(view: &'v V, overlays: &'v OverlayRegistry) -> Self {
        Self {
            view,
            overlays,
            policy: DestinationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DestinationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Trace `packet` entering the network at `ingress`.
    ///
    /// With `expected`, success means reaching that host; otherwise any
    /// host the packet reaches counts.
    pub fn trace(
        &self,
        packet: &Packet,
        ingress: &ConnectPoint,
        expected: Option<&Host>,
    ) -> Result<StaticPacketTrace, TraceError> {
        self.trace_cancellable(packet, ingress, expected, &CancellationToken::new())
    }

    /// Like [`Tracer::trace`], checking `cancel` before every branch step.
    pub fn trace_cancellable(
        &self,
        packet: &Packet,
        ingress: &ConnectPoint,
        expected: Option<&Host>,
        cancel: &CancellationToken,
    ) -> Result<StaticPacketTrace, TraceError> {
        if ingress.port.is_logical() && ingress.port != PortNumber::CONTROLLER {
            return Err(TraceError::LogicalIngress {
                ingress: ingress.clone(),
            });
        }
        if let Some(port) = packet.in_port() {
            if port != ingress.port {
                return Err(TraceError::InPortMismatch {
                    ingress: ingress.clone(),
                    packet_port: port,
                });
            }
        }
        let initial = packet.with_criterion(Criterion::InPort(ingress.port));
        info!(%ingress, packet = %initial, "starting trace");

        let destinations = match (expected, self.policy) {
            (Some(host), _) => BTreeSet::from([host.id()]),
            (None, DestinationPolicy::Derive) => self.destinations_of(&initial),
            (None, DestinationPolicy::AnyHost) => BTreeSet::new(),
        };
        let mut walk = Walk {
            view: self.view,
            overlays: self.overlays,
            initial: initial.clone(),
            constrained: expected.is_some() || !destinations.is_empty(),
            builder: TraceBuilder::new(
                initial.clone(),
                ingress.clone(),
                expected.map(Host::id),
                destinations.iter().copied().collect(),
            ),
            destinations,
            stack: vec![Frame {
                packet: initial,
                ingress: ingress.clone(),
                visited: BTreeSet::new(),
                path: Vec::new(),
            }],
        };

        let mut evaluated = 0usize;
        while let Some(frame) = walk.stack.pop() {
            if cancel.is_cancelled() {
                warn!(branches = evaluated, "trace cancelled");
                return Err(TraceError::Cancelled {
                    branches: evaluated,
                });
            }
            evaluated += 1;
            walk.step(frame);
        }

        let trace = walk.builder.build();
        debug!(branches = trace.branch_count(), success = trace.success, "trace finished");
        Ok(trace)
    }

    /// Hosts a packet is addressed to, by IP destination and MAC.
    fn destinations_of(&self, packet: &Packet) -> BTreeSet<HostId> {
        let mut hosts: BTreeSet<HostId> = packet
            .ip_dsts()
            .iter()
            .flat_map(|ip| {
                self.view
                    .hosts_by_ip(ip)
                    .iter()
                    .map(Host::id)
                    .collect::<Vec<_>>()
            })
            .collect();
        if let Some(mac) = packet.eth_dst() {
            hosts.extend(self.view.hosts_by_mac(&mac).iter().map(Host::id));
        }
        hosts
    }
}

/// One pending branch step.
#[derive(Debug, Clone)]
struct Frame {
    packet: Packet,
    ingress: ConnectPoint,
    visited: BTreeSet<ConnectPoint>,
    path: Vec<ConnectPoint>,
}

/// A packet leaving the pipeline or a group towards a port.
#[derive(Debug, Clone)]
struct Emission {
    port: PortNumber,
    packet: Packet,
    groups: Vec<GroupId>,
    alternative: bool,
    /// Sent back out of the ingress port on purpose (`IN_PORT`).
    reflected: bool,
}

impl Emission {
    fn plain(port: PortNumber, packet: Packet) -> Self {
        Self {
            port,
            packet,
            groups: Vec::new(),
            alternative: false,
            reflected: false,
        }
    }
}

/// State of a single trace call.
struct Walk<'v, V: NetworkView + ?Sized> {
    view: &'v V,
    overlays: &'v OverlayRegistry,
    initial: Packet,
    destinations: BTreeSet<HostId>,
    constrained: bool,
    builder: TraceBuilder,
    stack: Vec<Frame>,
}

impl<V: NetworkView + ?Sized> Walk<'_, V> {
    fn step(&mut self, mut frame: Frame) {
        frame.path.push(frame.ingress.clone());
        if !frame.visited.insert(frame.ingress.clone()) {
            debug!(at = %frame.ingress, "loop detected");
            let at = frame.ingress.clone();
            self.end(&frame, frame.packet.clone(), BranchOutcome::LoopDetected { at });
            return;
        }

        let device_id = frame.ingress.device.clone();
        let device = match self.view.device(&device_id) {
            Some(device) if device.available => device,
            Some(_) => {
                self.end(
                    &frame,
                    frame.packet.clone(),
                    BranchOutcome::DeviceOffline { device: device_id },
                );
                return;
            }
            None => {
                warn!(device = %device_id, "packet reached an unknown device");
                self.end(
                    &frame,
                    frame.packet.clone(),
                    BranchOutcome::UnknownDevice { device: device_id },
                );
                return;
            }
        };
        debug!(ingress = %frame.ingress, packet = %frame.packet, "evaluating hop");

        let discovery = frame.ingress.port == PortNumber::CONTROLLER
            && matches!(
                frame.packet.eth_type(),
                Some(ether_type::LLDP | ether_type::BDDP)
            );
        if discovery {
            let ports: Vec<PortNumber> = device.enabled_ports().collect();
            for port in ports {
                self.emit(&frame, &device, Emission::plain(port, frame.packet.clone()));
            }
            return;
        }

        let overlay = self.overlays.overlay_for(self.view, &device_id);
        let overlay = overlay.as_deref();
        let entries = self.view.entries_of(&device_id);
        let MatchOutcome {
            hits,
            packet,
            verdict,
        } = FlowTableMatcher::new(&device_id, &entries)
            .with_overlay(overlay)
            .evaluate(frame.ingress.port, &frame.packet);
        if !hits.is_empty() {
            self.builder.record_hits(
                &device_id,
                HitChain {
                    ingress: frame.ingress.clone(),
                    flows: hits,
                },
            );
        }

        let actions = match verdict {
            Verdict::Forward(actions) => actions,
            Verdict::NoMatch { table } => {
                self.end(
                    &frame,
                    packet,
                    BranchOutcome::NoMatch {
                        device: device_id,
                        table,
                    },
                );
                return;
            }
            Verdict::Dropped { reason } => {
                self.end(
                    &frame,
                    packet,
                    BranchOutcome::Dropped {
                        device: device_id,
                        reason,
                    },
                );
                return;
            }
        };

        let groups = self.view.groups_of(&device_id);
        let resolver = GroupResolver::new(&device_id, &groups, &frame.ingress).with_overlay(overlay);
        for action in actions {
            match action {
                Action::Output { port, packet } => {
                    self.emit(&frame, &device, Emission::plain(port, packet));
                }
                Action::ToGroup { id, packet } => {
                    let resolution = resolver.resolve(id, &packet);
                    for failure in resolution.failures {
                        self.group_failure(&frame, &device_id, &packet, failure);
                    }
                    for output in resolution.outputs {
                        let emission = Emission {
                            port: output.port,
                            packet: output.packet,
                            groups: output.groups,
                            alternative: output.alternative,
                            reflected: false,
                        };
                        self.emit(&frame, &device, emission);
                    }
                }
            }
        }
    }

    fn group_failure(
        &mut self,
        frame: &Frame,
        device: &DeviceId,
        packet: &Packet,
        failure: GroupFailure,
    ) {
        let device = device.clone();
        let (packet, outcome) = match failure {
            GroupFailure::InvalidGroup { id, .. } => (
                packet.clone(),
                BranchOutcome::InvalidGroup { device, group: id },
            ),
            GroupFailure::EmptyGroup { id, .. } => (
                packet.clone(),
                BranchOutcome::EmptyGroup { device, group: id },
            ),
            GroupFailure::GroupLoop { id, .. } => (
                packet.clone(),
                BranchOutcome::GroupLoop { device, group: id },
            ),
            GroupFailure::DroppedBucket { reason, packet, .. } => {
                (packet, BranchOutcome::Dropped { device, reason })
            }
        };
        self.end(frame, packet, outcome);
    }

    /// Resolve logical output ports, then send.
    fn emit(&mut self, frame: &Frame, device: &Device, mut emission: Emission) {
        match emission.port {
            PortNumber::IN_PORT => {
                emission.port = frame.ingress.port;
                emission.reflected = true;
                self.send(frame, emission);
            }
            PortNumber::FLOOD | PortNumber::ALL => {
                let ports: Vec<PortNumber> = device
                    .enabled_ports()
                    .filter(|p| *p != frame.ingress.port)
                    .collect();
                if ports.is_empty() {
                    self.end(
                        frame,
                        emission.packet,
                        BranchOutcome::Dropped {
                            device: device.id.clone(),
                            reason: format!("No port to flood to in device {}", device.id),
                        },
                    );
                    return;
                }
                for port in ports {
                    let mut copy = emission.clone();
                    copy.port = port;
                    self.send(frame, copy);
                }
            }
            PortNumber::CONTROLLER => self.to_controller(frame, emission),
            port if port.is_logical() => self.end(
                frame,
                emission.packet,
                BranchOutcome::Dropped {
                    device: device.id.clone(),
                    reason: format!("Unsupported logical output port {port} in device {}", device.id),
                },
            ),
            _ => self.send(frame, emission),
        }
    }

    fn to_controller(&mut self, frame: &Frame, emission: Emission) {
        let egress = frame.ingress.with_port(PortNumber::CONTROLLER);
        // A packet the pipeline tagged reaches the controller as it entered.
        let packet = match self.initial.vlan() {
            Some(vlan) if vlan.is_none() => emission
                .packet
                .with_criterion(Criterion::VlanVid(VlanId::NONE)),
            None => emission.packet.without(&[CriterionType::VlanVid]),
            Some(_) => emission.packet,
        };
        self.builder.record_hop(
            &egress.device,
            HopOutput {
                egress: egress.clone(),
                packet: packet.clone(),
                groups: emission.groups,
                alternative: emission.alternative,
                dropped: false,
            },
        );
        let mut hops = frame.path.clone();
        hops.push(egress.clone());
        self.finish(hops, packet, BranchOutcome::ToController { egress });
    }

    fn send(&mut self, frame: &Frame, emission: Emission) {
        let Emission {
            port,
            packet,
            groups,
            alternative,
            reflected,
        } = emission;
        let egress = frame.ingress.with_port(port);
        let bounced =
            !reflected && port == frame.ingress.port && packet.vlan() == frame.packet.vlan();
        self.builder.record_hop(
            &egress.device,
            HopOutput {
                egress: egress.clone(),
                packet: packet.clone(),
                groups,
                alternative,
                dropped: bounced,
            },
        );
        let mut hops = frame.path.clone();
        hops.push(egress.clone());
        if bounced {
            self.finish(hops, packet, BranchOutcome::OutputToIngress { egress });
            return;
        }

        match TopologyWalker::new(self.view).next(&egress) {
            NextHop::ToDevice(ingresses) => self.fork(frame, &hops, &packet, ingresses),
            NextHop::ToHost(hosts) => self.reach(hops, packet, egress, &hosts),
            NextHop::Branch { devices, hosts } => {
                self.reach(hops.clone(), packet.clone(), egress, &hosts);
                self.fork(frame, &hops, &packet, devices);
            }
            NextHop::DeadEnd(reason) => {
                self.finish(hops, packet, BranchOutcome::DeadEnd { egress, reason });
            }
        }
    }

    fn fork(
        &mut self,
        frame: &Frame,
        hops: &[ConnectPoint],
        packet: &Packet,
        ingresses: Vec<ConnectPoint>,
    ) {
        for ingress in ingresses.into_iter().rev() {
            debug!(to = %ingress, "following link");
            self.stack.push(Frame {
                packet: packet.with_criterion(Criterion::InPort(ingress.port)),
                ingress,
                visited: frame.visited.clone(),
                path: hops.to_vec(),
            });
        }
    }

    fn reach(&mut self, hops: Vec<ConnectPoint>, packet: Packet, egress: ConnectPoint, hosts: &[Host]) {
        let ids: Vec<HostId> = hosts.iter().map(Host::id).collect();
        let reach = if self.constrained {
            if ids.iter().any(|id| self.destinations.contains(id)) {
                Reach::Destination
            } else {
                Reach::WrongHost
            }
        } else {
            Reach::Unconstrained
        };
        debug!(%egress, ?reach, "reached hosts");
        self.finish(
            hops,
            packet,
            BranchOutcome::ReachedHost {
                egress,
                hosts: ids,
                reach,
            },
        );
    }

    fn end(&mut self, frame: &Frame, packet: Packet, outcome: BranchOutcome) {
        self.finish(frame.path.clone(), packet, outcome);
    }

    fn finish(&mut self, hops: Vec<ConnectPoint>, packet: Packet, outcome: BranchOutcome) {
        self.builder.finish_path(TracePath {
            hops,
            packet,
            outcome,
        });
    }
}
