mod cli;
mod commands;
mod context;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::context::RunContext;
use crate::error::CliError;
use crate::output::Presentation;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Completions(args) = &cli.command {
        use clap::CommandFactory;

        let mut cmd = Cli::command();
        clap_complete::generate(args.shell, &mut cmd, "flowtrace", &mut std::io::stdout());
        return Ok(());
    }

    let config = flowtrace_config::load_config()?;
    let out = Presentation::resolve(&cli.global, &config.defaults);

    match cli.command {
        // Config commands never touch a snapshot
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global, config, out),

        cmd => {
            let ctx = RunContext::build(&cli.global, &config)?;
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &ctx, out).await
        }
    }
}
