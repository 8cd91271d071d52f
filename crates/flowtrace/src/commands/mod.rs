//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod config_cmd;
pub mod inventory;
pub mod trace;
pub mod util;

use crate::cli::Command;
use crate::context::RunContext;
use crate::error::CliError;
use crate::output::Presentation;

/// Dispatch a snapshot-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    ctx: &RunContext,
    out: Presentation,
) -> Result<(), CliError> {
    match cmd {
        Command::Trace(args) => trace::handle_trace(ctx, args, out).await,
        Command::TraceHosts(args) => trace::handle_trace_hosts(ctx, args, out).await,
        Command::PingAll(args) => trace::handle_ping_all(ctx, args, out).await,
        Command::Devices => inventory::devices(ctx, out),
        Command::Flows(args) => inventory::flows(ctx, &args, out),
        Command::Groups(args) => inventory::groups(ctx, &args, out),
        Command::Links => inventory::links(ctx, out),
        Command::Hosts => inventory::hosts(ctx, out),
        Command::Overlays => inventory::overlays(ctx, out),
        // Handled before a snapshot is loaded
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal {
            message: "config and completions do not take a snapshot".into(),
        }),
    }
}
