//! Clap derive structures for the `flowtrace` CLI.
//!
//! Arguments stay plain strings here; handlers parse them into core
//! types. This file is also compiled by `build.rs` for man pages, so it
//! may only depend on clap and clap_complete.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// flowtrace -- static packet tracing over SDN flow-table snapshots
#[derive(Debug, Parser)]
#[command(
    name = "flowtrace",
    version,
    about = "Trace packets through a snapshot of an SDN network without sending traffic",
    long_about = "Simulates how a packet would be forwarded by interpreting the installed\n\
        flow tables, groups, links and host locations of a network snapshot.\n\n\
        Snapshots are JSON, YAML or TOML files; profiles in the config file\n\
        name a snapshot and the pipeline overlays to apply per driver.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config profile to use
    #[arg(long, short = 'p', env = "FLOWTRACE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Snapshot file (overrides the profile)
    #[arg(long, short = 's', env = "FLOWTRACE_SNAPSHOT", global = true)]
    pub snapshot: Option<PathBuf>,

    /// Map a device driver to an overlay: DRIVER=ofdpa|ofdpa-ovs|generic
    #[arg(long = "overlay", value_name = "DRIVER=KIND", global = true)]
    pub overlays: Vec<String>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "FLOWTRACE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Per-trace timeout in seconds (overrides the profile)
    #[arg(long, env = "FLOWTRACE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty tables (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one line per item (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Color when stdout is a terminal and NO_COLOR is unset
    Auto,
    Always,
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Trace a packet from an ingress connect point
    #[command(alias = "t")]
    Trace(TraceArgs),

    /// Trace between two known hosts
    #[command(alias = "th")]
    TraceHosts(TraceHostsArgs),

    /// Trace every eligible pair of hosts
    PingAll(PingAllArgs),

    /// List devices in the snapshot
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// List flow entries
    Flows(DeviceFilterArgs),

    /// List groups
    Groups(DeviceFilterArgs),

    /// List infrastructure links
    Links,

    /// List hosts
    Hosts,

    /// Show which overlay applies to each driver
    Overlays,

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TRACES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TraceArgs {
    /// Packet header fields, e.g. "ETH_TYPE=ipv4, IPV4_DST=10.0.0.2/32"
    pub packet: String,

    /// Ingress connect point, e.g. "of:0000000000000001/1"
    #[arg(long, short = 'i')]
    pub ingress: String,

    /// Host the packet must reach (MAC or MAC/VLAN)
    #[arg(long, short = 'e')]
    pub expect: Option<String>,

    /// Count any reached host as success instead of deriving destinations
    #[arg(long, conflicts_with = "expect")]
    pub any_host: bool,
}

#[derive(Debug, Args)]
pub struct TraceHostsArgs {
    /// Source host (MAC or MAC/VLAN)
    pub src: String,

    /// Destination host (MAC or MAC/VLAN)
    pub dst: String,

    /// Ethernet type of the probe: ipv4, ipv6, arp, or a number
    #[arg(long, default_value = "ipv4")]
    pub eth_type: String,
}

#[derive(Debug, Args)]
pub struct PingAllArgs {
    /// Ethernet type of the probes: ipv4 or ipv6
    #[arg(long, default_value = "ipv4")]
    pub eth_type: String,

    /// Only print pairs that failed
    #[arg(long)]
    pub failures: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  INVENTORY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DeviceFilterArgs {
    /// Only show entries of this device
    #[arg(long, short = 'd')]
    pub device: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a profile for a snapshot file
    Init {
        /// Snapshot file the profile points at
        snapshot: PathBuf,

        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Replace an existing profile of the same name
        #[arg(long)]
        force: bool,
    },

    /// Display the current resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// Set a value on the active profile
    Set {
        /// snapshot, destination, timeout or overlays.<driver>
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
