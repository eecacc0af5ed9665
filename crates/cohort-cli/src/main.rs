//! Cohort CLI
//!
//! Runs several commands as one process group. With `--timeout` the group is
//! interrupted and then killed when the deadline passes; without it, signals
//! received by `cohort` are relayed to every command.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use cohort_cli::Cli;
use cohort_core::tracing_init::{default_filter, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.resolve()?;
    init_tracing(&default_filter(config.log_level()), cli.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting cohort");

    Ok(cohort_cli::report(cohort_cli::run(&config).await))
}
