// ── Instructions and treatments ──

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::{MacAddress, PortNumber, VlanId};

/// Flow table identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group identifier, unique per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One action in a treatment or bucket.
///
/// Header modifications rewrite the packet in place; `Output`, `Group`
/// and `Drop` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    Output { port: PortNumber },
    Group { id: GroupId },
    Drop,
    SetVlanId { vlan: VlanId },
    PushVlan { vlan: VlanId },
    PopVlan,
    SetEthSrc { mac: MacAddress },
    SetEthDst { mac: MacAddress },
    /// Pushes a label stack entry; `eth_type` is the new outer type.
    PushMpls { eth_type: u16 },
    /// Pops the outer label; `eth_type` is the restored payload type.
    PopMpls { eth_type: u16 },
    SetMplsLabel { label: u32 },
}

impl Instruction {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Output { .. } | Self::Group { .. } | Self::Drop)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output { port } => write!(f, "OUTPUT:{port}"),
            Self::Group { id } => write!(f, "GROUP:{id}"),
            Self::Drop => f.write_str("DROP"),
            Self::SetVlanId { vlan } => write!(f, "VLAN_ID:{vlan}"),
            Self::PushVlan { vlan } => write!(f, "VLAN_PUSH:{vlan}"),
            Self::PopVlan => f.write_str("VLAN_POP"),
            Self::SetEthSrc { mac } => write!(f, "ETH_SRC:{mac}"),
            Self::SetEthDst { mac } => write!(f, "ETH_DST:{mac}"),
            Self::PushMpls { eth_type } => write!(f, "MPLS_PUSH:{eth_type:#06x}"),
            Self::PopMpls { eth_type } => write!(f, "MPLS_POP:{eth_type:#06x}"),
            Self::SetMplsLabel { label } => write!(f, "MPLS_LABEL:{label}"),
        }
    }
}

/// What a flow entry does once it matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Treatment {
    /// Applied as soon as the entry is hit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub immediate: Vec<Instruction>,
    /// Write-actions: accumulated and applied at the end of the pipeline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_deferred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TableId>,
}

impl Treatment {
    pub fn immediate(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Self {
            immediate: instructions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_deferred(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.deferred.extend(instructions);
        self
    }

    pub fn with_clear_deferred(mut self) -> Self {
        self.clear_deferred = true;
        self
    }

    pub fn with_transition(mut self, table: TableId) -> Self {
        self.transition = Some(table);
        self
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |list: &[Instruction]| {
            list.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(f, "immediate=[{}]", join(&self.immediate))?;
        if !self.deferred.is_empty() {
            write!(f, " deferred=[{}]", join(&self.deferred))?;
        }
        if self.clear_deferred {
            f.write_str(" clear")?;
        }
        if let Some(table) = self.transition {
            write!(f, " transition={table}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn instruction_serde_is_tagged() {
        let json = r#"{"type":"OUTPUT","port":"CONTROLLER"}"#;
        let inst: Instruction = serde_json::from_str(json).unwrap();
        assert_eq!(
            inst,
            Instruction::Output {
                port: PortNumber::CONTROLLER
            }
        );
        assert!(inst.is_terminal());
        assert!(!Instruction::PopVlan.is_terminal());
    }

    #[test]
    fn treatment_defaults_when_fields_missing() {
        let t: Treatment = serde_json::from_str(r#"{"transition":30}"#).unwrap();
        assert!(t.immediate.is_empty());
        assert_eq!(t.transition, Some(TableId(30)));
        assert_eq!(t.to_string(), "immediate=[] transition=30");
    }
}
