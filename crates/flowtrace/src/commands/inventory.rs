//! Snapshot inventory listings: devices, flows, groups, links, hosts and
//! the driver overlay table.

use serde::Serialize;
use tabled::Tabled;

use flowtrace_core::model::{Device, DeviceId, FlowEntry, Group, Host, Link};
use flowtrace_core::providers::{
    DeviceProvider, FlowProvider, GroupProvider, HostProvider, LinkProvider,
};

use crate::cli::DeviceFilterArgs;
use crate::context::RunContext;
use crate::error::CliError;
use crate::output::{self, Presentation};

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Driver")]
    driver: String,
    #[tabled(rename = "Overlay")]
    overlay: &'static str,
    #[tabled(rename = "Available")]
    available: &'static str,
    #[tabled(rename = "Ports")]
    ports: String,
    #[tabled(rename = "Router MAC")]
    router_mac: String,
    #[tabled(rename = "Flows")]
    flows: usize,
    #[tabled(rename = "Groups")]
    groups: usize,
}

#[derive(Tabled)]
struct FlowRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Priority")]
    priority: u32,
    #[tabled(rename = "Selector")]
    selector: String,
    #[tabled(rename = "Treatment")]
    treatment: String,
}

impl From<&FlowEntry> for FlowRow {
    fn from(f: &FlowEntry) -> Self {
        Self {
            device: f.device.to_string(),
            table: f.table.to_string(),
            priority: f.priority,
            selector: util::join(&f.selector, ", "),
            treatment: f.treatment.to_string(),
        }
    }
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    group_type: String,
    #[tabled(rename = "Buckets")]
    buckets: String,
}

impl From<&Group> for GroupRow {
    fn from(g: &Group) -> Self {
        let buckets: Vec<String> = g
            .buckets
            .iter()
            .map(|b| format!("[{}]", util::join(&b.instructions, ", ")))
            .collect();
        Self {
            device: g.device.to_string(),
            id: g.id.to_string(),
            group_type: g.group_type.to_string(),
            buckets: buckets.join(" "),
        }
    }
}

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Source")]
    src: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "Type")]
    link_type: String,
}

impl From<&Link> for LinkRow {
    fn from(l: &Link) -> Self {
        Self {
            src: l.src.to_string(),
            dst: l.dst.to_string(),
            link_type: l.link_type.to_string(),
        }
    }
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "IPs")]
    ips: String,
    #[tabled(rename = "Locations")]
    locations: String,
}

impl From<&Host> for HostRow {
    fn from(h: &Host) -> Self {
        Self {
            id: h.id().to_string(),
            ips: util::join(&h.ips, ", "),
            locations: util::join(&h.locations, ", "),
        }
    }
}

#[derive(Serialize, Tabled)]
struct OverlayRow {
    #[tabled(rename = "Driver")]
    driver: String,
    #[tabled(rename = "Overlay")]
    overlay: &'static str,
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn devices(ctx: &RunContext, out: Presentation) -> Result<(), CliError> {
    let snapshot = ctx.snapshot.as_ref();
    let devices = snapshot.devices();
    let rendered = output::render_list(
        out.format,
        &devices,
        |d: &Device| {
            let enabled = d.enabled_ports().count();
            DeviceRow {
                id: d.id.to_string(),
                driver: d.driver.clone().unwrap_or_else(|| "-".into()),
                overlay: ctx
                    .overlays
                    .overlay_for(snapshot, &d.id)
                    .map_or("generic", |o| o.name()),
                available: if d.available { "yes" } else { "no" },
                ports: if d.ports.is_empty() {
                    "-".into()
                } else {
                    format!("{enabled}/{}", d.ports.len())
                },
                router_mac: d.router_mac.map_or_else(|| "-".into(), |m| m.to_string()),
                flows: snapshot.entries_of(&d.id).len(),
                groups: snapshot.groups_of(&d.id).len(),
            }
        },
        |d| d.id.to_string(),
    )?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

pub fn flows(ctx: &RunContext, args: &DeviceFilterArgs, out: Presentation) -> Result<(), CliError> {
    let snapshot = ctx.snapshot.as_ref();
    let filter = util::resolve_device(snapshot, args.device.as_deref())?;
    let flows: Vec<FlowEntry> = selected_devices(ctx, filter.as_ref())
        .iter()
        .flat_map(|id| snapshot.entries_of(id).as_ref().clone())
        .collect();
    let rendered = output::render_list(
        out.format,
        &flows,
        |f| FlowRow::from(f),
        ToString::to_string,
    )?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

pub fn groups(ctx: &RunContext, args: &DeviceFilterArgs, out: Presentation) -> Result<(), CliError> {
    let snapshot = ctx.snapshot.as_ref();
    let filter = util::resolve_device(snapshot, args.device.as_deref())?;
    let groups: Vec<Group> = selected_devices(ctx, filter.as_ref())
        .iter()
        .flat_map(|id| snapshot.groups_of(id).as_ref().clone())
        .collect();
    let rendered = output::render_list(out.format, &groups, |g| GroupRow::from(g), |g| {
        format!("{} {}", g.device, g.id)
    })?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

pub fn links(ctx: &RunContext, out: Presentation) -> Result<(), CliError> {
    let links = ctx.snapshot.links();
    let rendered = output::render_list(out.format, &links, |l| LinkRow::from(l), |l| {
        format!("{} {}", l.src, l.dst)
    })?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

pub fn hosts(ctx: &RunContext, out: Presentation) -> Result<(), CliError> {
    let mut hosts = ctx.snapshot.hosts();
    hosts.sort_by_key(Host::id);
    let rendered = output::render_list(
        out.format,
        &hosts,
        |h| HostRow::from(h),
        |h| h.id().to_string(),
    )?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

pub fn overlays(ctx: &RunContext, out: Presentation) -> Result<(), CliError> {
    let rows: Vec<OverlayRow> = ctx
        .overlays
        .drivers()
        .into_iter()
        .map(|(driver, overlay)| OverlayRow { driver, overlay })
        .collect();
    let rendered = output::render_list(
        out.format,
        &rows,
        |r| OverlayRow {
            driver: r.driver.clone(),
            overlay: r.overlay,
        },
        |r| format!("{} {}", r.driver, r.overlay),
    )?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

/// The filtered device, or every device in snapshot order.
fn selected_devices(ctx: &RunContext, filter: Option<&DeviceId>) -> Vec<DeviceId> {
    filter.map_or_else(
        || ctx.snapshot.devices().into_iter().map(|d| d.id).collect(),
        |id| vec![id.clone()],
    )
}
