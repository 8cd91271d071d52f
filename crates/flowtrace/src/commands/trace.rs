//! Trace command handlers: packet traces, host-to-host traces and ping-all.

use std::fmt::Write as _;

use futures::future::join_all;
use tabled::Tabled;
use tracing::info;

use flowtrace_core::engine::{HopOutput, TracePath};
use flowtrace_core::model::{ConnectPoint, DeviceId, HostId, Packet, ether_type};
use flowtrace_core::{DestinationPolicy, StaticPacketTrace};

use crate::cli::{PingAllArgs, TraceArgs, TraceHostsArgs};
use crate::context::RunContext;
use crate::error::CliError;
use crate::output::{self, Presentation};

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PathRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Hops")]
    hops: String,
    #[tabled(rename = "Outcome")]
    outcome: &'static str,
    #[tabled(rename = "Packet")]
    packet: String,
}

impl PathRow {
    fn new(index: usize, path: &TracePath) -> Self {
        Self {
            index: index + 1,
            hops: util::join(&path.hops, " -> "),
            outcome: path.outcome.label(),
            packet: path.packet.to_string(),
        }
    }
}

#[derive(Tabled)]
struct HopRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Egress")]
    egress: String,
    #[tabled(rename = "Groups")]
    groups: String,
    #[tabled(rename = "Note")]
    note: &'static str,
    #[tabled(rename = "Packet")]
    packet: String,
}

impl HopRow {
    fn new(device: &DeviceId, hop: &HopOutput) -> Self {
        let note = match (hop.dropped, hop.alternative) {
            (true, _) => "dropped",
            (false, true) => "alternative",
            (false, false) => "",
        };
        Self {
            device: device.to_string(),
            egress: hop.egress.port.to_string(),
            groups: util::join(&hop.groups, ", "),
            note,
            packet: hop.packet.to_string(),
        }
    }
}

#[derive(Tabled)]
struct PairRow {
    #[tabled(rename = "Source")]
    src: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "Ingress")]
    ingress: String,
    #[tabled(rename = "Branches")]
    branches: usize,
    #[tabled(rename = "Result")]
    result: String,
}

impl PairRow {
    fn new(trace: &StaticPacketTrace, color: bool) -> Self {
        let (src, dst) = trace
            .endpoints
            .map_or_else(|| ("-".into(), "-".into()), |(s, d)| (s.to_string(), d.to_string()));
        Self {
            src,
            dst,
            ingress: trace
                .ingress
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string),
            branches: trace.branch_count(),
            result: output::verdict(trace.success, color),
        }
    }
}

// ── Detail view ─────────────────────────────────────────────────────

fn detail(trace: &StaticPacketTrace, color: bool) -> String {
    let mut out = String::new();
    if let Some((src, dst)) = &trace.endpoints {
        let _ = writeln!(out, "Trace from {src} to {dst}");
    }
    if let (Some(packet), Some(ingress)) = (&trace.initial_packet, &trace.ingress) {
        let _ = writeln!(out, "Packet {packet} entering at {ingress}");
    }
    if !trace.paths.is_empty() {
        let rows: Vec<PathRow> = trace
            .paths
            .iter()
            .enumerate()
            .map(|(i, p)| PathRow::new(i, p))
            .collect();
        let _ = writeln!(out, "{}", output::render_table(&rows));
    }
    let hops: Vec<HopRow> = trace
        .hop_outputs
        .iter()
        .flat_map(|(device, hops)| hops.iter().map(move |hop| HopRow::new(device, hop)))
        .collect();
    if !hops.is_empty() {
        let _ = writeln!(out, "{}", output::render_table(&hops));
    }
    for message in &trace.messages {
        let _ = writeln!(out, "{message}");
    }
    out.push_str(&output::verdict(trace.success, color));
    out
}

fn render_traces(traces: &[StaticPacketTrace], out: Presentation) -> Result<String, CliError> {
    output::render_single(
        out.format,
        traces,
        |ts| {
            ts.iter()
                .map(|t| detail(t, out.color))
                .collect::<Vec<_>>()
                .join("\n\n")
        },
        |ts| {
            ts.iter()
                .map(|t| output::verdict(t.success, false))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )
}

/// Print, then turn unsuccessful traces into a non-zero exit.
fn finish(traces: &[StaticPacketTrace], rendered: &str, quiet: bool) -> Result<(), CliError> {
    output::print_output(rendered, quiet);
    let failed = traces.iter().filter(|t| !t.success).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::TraceFailed {
            failed,
            total: traces.len(),
        })
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle_trace(
    ctx: &RunContext,
    args: TraceArgs,
    out: Presentation,
) -> Result<(), CliError> {
    let packet: Packet = args.packet.parse()?;
    let ingress: ConnectPoint = args.ingress.parse()?;
    let expected = args
        .expect
        .as_deref()
        .map(|raw| util::resolve_host(&ctx.snapshot, raw))
        .transpose()?;
    let any_host = args.any_host;

    let trace = ctx
        .run(move |tracer, cancel| {
            let tracer = if any_host {
                tracer.with_policy(DestinationPolicy::AnyHost)
            } else {
                tracer
            };
            Ok(tracer.trace_cancellable(&packet, &ingress, expected.as_ref(), cancel)?)
        })
        .await?;

    let traces = [trace];
    let rendered = output::render_single(
        out.format,
        &traces[0],
        |t| detail(t, out.color),
        |t| output::verdict(t.success, false),
    )?;
    finish(&traces, &rendered, out.quiet)
}

pub async fn handle_trace_hosts(
    ctx: &RunContext,
    args: TraceHostsArgs,
    out: Presentation,
) -> Result<(), CliError> {
    let src: HostId = util::resolve_host(&ctx.snapshot, &args.src)?.id();
    let dst: HostId = util::resolve_host(&ctx.snapshot, &args.dst)?.id();
    let eth_type = ether_type::parse(&args.eth_type)?;

    let traces = ctx
        .run(move |tracer, cancel| tracer.trace_hosts_cancellable(&src, &dst, eth_type, cancel))
        .await?;
    let rendered = render_traces(&traces, out)?;
    finish(&traces, &rendered, out.quiet)
}

pub async fn handle_ping_all(
    ctx: &RunContext,
    args: PingAllArgs,
    out: Presentation,
) -> Result<(), CliError> {
    let eth_type = util::probe_eth_type(&args.eth_type)?;
    let pairs = ctx.run(move |tracer, _| Ok(tracer.ping_pairs(eth_type))).await?;
    info!(pairs = pairs.len(), "ping-all");

    let runs = pairs.into_iter().map(|(src, dst)| {
        ctx.run(move |tracer, cancel| tracer.trace_hosts_cancellable(&src, &dst, eth_type, cancel))
    });
    let mut traces = Vec::new();
    for result in join_all(runs).await {
        traces.extend(result?);
    }

    let shown: Vec<StaticPacketTrace> = if args.failures {
        traces.iter().filter(|t| !t.success).cloned().collect()
    } else {
        traces.clone()
    };
    let rendered = output::render_list(
        out.format,
        &shown,
        |t| PairRow::new(t, out.color),
        |t| {
            let (src, dst) = t
                .endpoints
                .map_or_else(|| ("-".into(), "-".into()), |(s, d)| (s.to_string(), d.to_string()));
            format!("{src} {dst} {}", output::verdict(t.success, false))
        },
    )?;
    finish(&traces, &rendered, out.quiet)
}
