// ── Groups and buckets ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::identity::{DeviceId, PortNumber};
use super::instruction::{GroupId, Instruction};

/// How a group's buckets fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    /// Exactly one bucket, always fires.
    Indirect,
    /// Every bucket fires (fan-out).
    All,
    /// One bucket fires, chosen by hashing.
    Select,
    /// First live bucket fires.
    #[serde(alias = "FAILOVER")]
    #[strum(to_string = "FAST_FAILOVER", serialize = "FAILOVER")]
    FastFailover,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_port: Option<PortNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
}

impl Bucket {
    pub fn new(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Self {
            instructions: instructions.into_iter().collect(),
            watch_port: None,
            weight: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub device: DeviceId,
    pub id: GroupId,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

impl Group {
    pub fn new(device: impl Into<DeviceId>, id: GroupId, group_type: GroupType) -> Self {
        Self {
            device: device.into(),
            id,
            group_type,
            buckets: Vec::new(),
        }
    }

    pub fn with_bucket(mut self, bucket: Bucket) -> Self {
        self.buckets.push(bucket);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn failover_alias_is_accepted() {
        let t: GroupType = "failover".parse().unwrap();
        assert_eq!(t, GroupType::FastFailover);
        let t: GroupType = serde_json::from_str("\"FAILOVER\"").unwrap();
        assert_eq!(t, GroupType::FastFailover);
        assert_eq!(GroupType::FastFailover.to_string(), "FAST_FAILOVER");
    }
}
