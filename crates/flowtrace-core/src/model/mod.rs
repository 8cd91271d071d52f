// ── Network model ──
//
// Read-only snapshots of the control-plane state a trace runs against,
// plus the symbolic packet the engine pushes through it.

pub mod criterion;
pub mod flow;
pub mod group;
pub mod identity;
pub mod instruction;
pub mod packet;
pub mod topology;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use flowtrace_core::model::*` gives you everything.

pub use criterion::{Criterion, CriterionType, ether_type};
pub use flow::FlowEntry;
pub use group::{Bucket, Group, GroupType};
pub use identity::{ConnectPoint, DeviceId, HostId, MacAddress, PortNumber, VlanId};
pub use instruction::{GroupId, Instruction, TableId, Treatment};
pub use packet::Packet;
pub use topology::{Device, Host, Link, LinkType, PortInfo, is_link_local};
