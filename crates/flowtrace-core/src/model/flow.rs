// ── Flow entries ──

use std::fmt;

use serde::{Deserialize, Serialize};

use super::criterion::Criterion;
use super::identity::DeviceId;
use super::instruction::{TableId, Treatment};
use super::packet::Packet;

/// A priority-ordered match-action rule installed on one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEntry {
    pub device: DeviceId,
    #[serde(default)]
    pub table: TableId,
    pub priority: u32,
    /// Criteria that must all hold. Absent types are wildcards.
    #[serde(default)]
    pub selector: Vec<Criterion>,
    #[serde(default)]
    pub treatment: Treatment,
}

impl FlowEntry {
    pub fn new(device: impl Into<DeviceId>, table: TableId, priority: u32) -> Self {
        Self {
            device: device.into(),
            table,
            priority,
            selector: Vec::new(),
            treatment: Treatment::default(),
        }
    }

    pub fn matching(mut self, criteria: impl IntoIterator<Item = Criterion>) -> Self {
        self.selector.extend(criteria);
        self
    }

    pub fn treating(mut self, treatment: Treatment) -> Self {
        self.treatment = treatment;
        self
    }

    /// Whether every selector criterion holds for `packet`.
    pub fn matches(&self, packet: &Packet) -> bool {
        self.selector.iter().all(|c| c.matches(packet))
    }
}

impl fmt::Display for FlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selector: Vec<String> = self.selector.iter().map(ToString::to_string).collect();
        write!(
            f,
            "table={} priority={} selector=[{}] {}",
            self.table,
            self.priority,
            selector.join(", "),
            self.treatment
        )
    }
}
