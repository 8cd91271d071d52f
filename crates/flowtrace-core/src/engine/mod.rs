// ── Trace engine ──
//
// Flow-table matching, group expansion, topology walking and the
// orchestrator that ties them into a `StaticPacketTrace`.

mod actions;
pub mod group;
mod hosts;
pub mod matcher;
pub mod ofdpa;
pub mod overlay;
pub mod result;
pub mod trace;
pub mod walker;

pub use group::{GroupFailure, GroupResolver, Resolution, ResolvedOutput};
pub use matcher::{Action, FlowTableMatcher, MatchOutcome, Verdict};
pub use ofdpa::OfdpaOverlay;
pub use overlay::{
    HitContext, MissAction, MissContext, OverlayKind, OverlayRegistry, PipelineOverlay,
};
pub use result::{
    BranchOutcome, HitChain, HopOutput, Reach, StaticPacketTrace, TraceBuilder, TracePath,
};
pub use trace::{DestinationPolicy, Tracer};
pub use walker::{DeadEndReason, NextHop, TopologyWalker};
