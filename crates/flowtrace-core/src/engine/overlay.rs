// ── Driver pipeline overlays ──
//
// Hardware pipelines compile logical flow tables into fixed-function
// stages, so what a controller installed and what the ASIC does differ in
// a few well-known places. An overlay captures those differences for one
// family of drivers. Devices whose driver has no overlay are evaluated
// with plain OpenFlow semantics.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::matcher::MatchOutcome;
use super::ofdpa::OfdpaOverlay;
use crate::error::CoreError;
use crate::model::{Bucket, ConnectPoint, DeviceId, FlowEntry, Group, Packet, TableId};
use crate::providers::DeviceProvider;

/// What a table-miss means on a given pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissAction {
    /// The packet has no match; the pipeline stops without output.
    NoMatch,
    /// Continue at `next`, possibly with a rewritten packet.
    Continue { next: TableId, packet: Packet },
    /// Stop walking tables and execute what has been accumulated.
    EndPipeline,
}

/// Inputs to a table-miss decision.
#[derive(Debug, Clone, Copy)]
pub struct MissContext<'a> {
    pub table: TableId,
    pub packet: &'a Packet,
    pub entries: &'a [FlowEntry],
    /// Entries hit so far in this pipeline walk.
    pub hits: usize,
}

/// Inputs to a hit verification.
#[derive(Debug, Clone, Copy)]
pub struct HitContext<'a> {
    pub entry: &'a FlowEntry,
    /// The packet after the entry's immediate modifications.
    pub packet: &'a Packet,
    pub entries: &'a [FlowEntry],
}

/// Per-driver adjustments to matcher and resolver outcomes.
///
/// Every method has a no-op default, so an overlay only overrides the
/// stages its hardware actually changes.
pub trait PipelineOverlay: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn table_miss(&self, ctx: &MissContext<'_>) -> MissAction {
        let _ = ctx;
        MissAction::NoMatch
    }

    /// Check a hit that the hardware only honours together with a
    /// companion entry. `Ok(Some(_))` returns the companion, which joins
    /// the hit chain; `Err` carries the reason the packet is dropped.
    fn verify_hit(&self, ctx: &HitContext<'_>) -> Result<Option<FlowEntry>, String> {
        let _ = ctx;
        Ok(None)
    }

    /// Whether the hardware discards `bucket` of `group` for a packet
    /// that entered the device at `ingress`.
    fn drops_bucket(&self, group: &Group, bucket: &Bucket, ingress: &ConnectPoint) -> bool {
        let _ = (group, bucket, ingress);
        false
    }

    /// Whether an MPLS push records the previous Ethernet type in METADATA.
    fn stashes_eth_type(&self) -> bool {
        false
    }

    /// Last word on a device's pipeline outcome.
    fn adjust_outcome(&self, outcome: MatchOutcome) -> MatchOutcome {
        outcome
    }
}

/// Built-in overlay families that configuration can name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    /// OF-DPA on switching hardware.
    Ofdpa,
    /// OF-DPA emulated in software; follows logical semantics.
    OfdpaOvs,
    /// No overlay.
    Generic,
}

impl OverlayKind {
    pub fn build(self) -> Option<Arc<dyn PipelineOverlay>> {
        match self {
            Self::Ofdpa => Some(Arc::new(OfdpaOverlay::hardware())),
            Self::OfdpaOvs => Some(Arc::new(OfdpaOverlay::virtual_switch())),
            Self::Generic => None,
        }
    }
}

/// Overlays keyed by driver identifier.
#[derive(Debug, Clone, Default)]
pub struct OverlayRegistry {
    by_driver: HashMap<String, Arc<dyn PipelineOverlay>>,
}

impl OverlayRegistry {
    /// Driver names the OF-DPA overlay is registered for out of the box.
    pub const OFDPA_HARDWARE_DRIVERS: [&'static str; 4] =
        ["ofdpa", "ofdpa3", "qmx-ofdpa3", "znyx-ofdpa"];
    pub const OFDPA_VIRTUAL_DRIVERS: [&'static str; 1] = ["ofdpa-ovs"];

    /// A registry with no overlays: every device is generic.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in driver mappings.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let hardware: Arc<dyn PipelineOverlay> = Arc::new(OfdpaOverlay::hardware());
        let virtual_switch: Arc<dyn PipelineOverlay> = Arc::new(OfdpaOverlay::virtual_switch());
        for driver in Self::OFDPA_HARDWARE_DRIVERS {
            registry.register(driver, Arc::clone(&hardware));
        }
        for driver in Self::OFDPA_VIRTUAL_DRIVERS {
            registry.register(driver, Arc::clone(&virtual_switch));
        }
        registry
    }

    pub fn register(&mut self, driver: impl Into<String>, overlay: Arc<dyn PipelineOverlay>) {
        self.by_driver.insert(driver.into(), overlay);
    }

    /// Map `driver` to a built-in overlay family by name. `generic`
    /// removes any overlay registered for the driver.
    pub fn assign(&mut self, driver: &str, kind: &str) -> Result<(), CoreError> {
        let kind: OverlayKind = kind.parse().map_err(|_| CoreError::Parse {
            kind: "overlay kind",
            input: kind.to_owned(),
            reason: "expected ofdpa, ofdpa-ovs or generic".into(),
        })?;
        match kind.build() {
            Some(overlay) => self.register(driver, overlay),
            None => {
                self.by_driver.remove(driver);
            }
        }
        Ok(())
    }

    pub fn get(&self, driver: &str) -> Option<Arc<dyn PipelineOverlay>> {
        self.by_driver.get(driver).cloned()
    }

    /// Overlay for a device, looked up through its driver.
    pub fn overlay_for<P>(&self, devices: &P, device: &DeviceId) -> Option<Arc<dyn PipelineOverlay>>
    where
        P: DeviceProvider + ?Sized,
    {
        devices.driver_of(device).and_then(|driver| self.get(&driver))
    }

    /// Registered drivers, sorted.
    pub fn drivers(&self) -> Vec<(String, &'static str)> {
        let mut drivers: Vec<(String, &'static str)> = self
            .by_driver
            .iter()
            .map(|(driver, overlay)| (driver.clone(), overlay.name()))
            .collect();
        drivers.sort();
        drivers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_ofdpa_drivers() {
        let registry = OverlayRegistry::with_builtin();
        assert_eq!(registry.get("qmx-ofdpa3").unwrap().name(), "ofdpa");
        assert_eq!(registry.get("ofdpa-ovs").unwrap().name(), "ofdpa-ovs");
        assert!(registry.get("ovs").is_none());
    }

    #[test]
    fn assign_generic_removes_overlay() {
        let mut registry = OverlayRegistry::with_builtin();
        registry.assign("ofdpa3", "generic").unwrap();
        assert!(registry.get("ofdpa3").is_none());
        registry.assign("my-asic", "OFDPA").unwrap();
        assert_eq!(registry.get("my-asic").unwrap().name(), "ofdpa");
        assert!(registry.assign("x", "p4").is_err());
    }
}
