// ── flowtrace-core ──
//
// Static packet tracing for software-defined networks. Given a read-only
// view of installed flows, groups, links and hosts, the engine works out
// where a packet injected at a connect point would go, without touching
// the data plane.

pub mod engine;
pub mod error;
pub mod model;
pub mod providers;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────

pub use engine::{
    BranchOutcome, DestinationPolicy, OverlayKind, OverlayRegistry, PipelineOverlay,
    StaticPacketTrace, Tracer,
};
pub use error::{CoreError, TraceError};
pub use model::{ConnectPoint, DeviceId, Host, HostId, Packet};
pub use providers::NetworkView;
pub use store::{NetworkSnapshot, SnapshotDocument, SnapshotFormat};
