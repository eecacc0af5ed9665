//! Cohort CLI Library
//!
//! Argument parsing and run dispatch for the `cohort` binary, which starts
//! several commands as one process group and either enforces a deadline on
//! them or relays supervisor signals to them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use cohort_core::config::{duration_millis, load_config, parse_duration};
use cohort_core::{
    CommandSpec, RunConfig, StopContext, run_with_deadline, run_with_signal_relay,
};

/// Run several commands as one group.
#[derive(Debug, Parser)]
#[command(name = "cohort", version, about, long_about = None)]
pub struct Cli {
    /// JSON run configuration file
    #[arg(short, long, env = "COHORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stop the group after this long (e.g. "30s", "500ms")
    #[arg(short, long, value_parser = duration_arg)]
    pub timeout: Option<Duration>,

    /// Signal sent to the group when the timeout fires (e.g. "INT")
    #[arg(short, long)]
    pub interrupt: Option<String>,

    /// Grace period after the interrupt before the group is killed
    #[arg(short = 'k', long, value_parser = duration_arg)]
    pub kill_after: Option<Duration>,

    /// Signal to relay to the group when running without a timeout (repeatable)
    #[arg(short, long = "relay")]
    pub relay: Vec<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,

    /// Commands to run, each a whitespace-separated program and arguments
    pub commands: Vec<String>,
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Resolve the final run configuration: config files and environment
    /// first, then the command line on top.
    pub fn resolve(&self) -> anyhow::Result<RunConfig> {
        let mut config = load_config(self.config.as_deref())?;
        self.apply_to(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_to(&self, config: &mut RunConfig) -> anyhow::Result<()> {
        if !self.commands.is_empty() {
            config.commands = self
                .commands
                .iter()
                .map(|line| CommandSpec::parse(line))
                .collect::<cohort_core::Result<_>>()?;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = Some(duration_millis(timeout));
        }
        if let Some(ref interrupt) = self.interrupt {
            config.interrupt = Some(interrupt.clone());
        }
        if let Some(kill_after) = self.kill_after {
            config.kill_after_ms = Some(duration_millis(kill_after));
        }
        if !self.relay.is_empty() {
            config.relay_signals.clone_from(&self.relay);
        }
        Ok(())
    }
}

/// Run the group described by `config` until it exits or is stopped.
pub async fn run(config: &RunConfig) -> cohort_core::Result<()> {
    let group = config.build_group();

    if let Some(timeout) = config.timeout() {
        let interrupt = config.interrupt_signal()?;
        let kill_after = config.kill_after();
        info!(members = group.len(), ?timeout, ?interrupt, ?kill_after, "Running with deadline");

        let stop = StopContext::with_timeout(timeout);
        let shutdown = tokio::spawn(cancel_on_shutdown(stop.clone()));
        let result = run_with_deadline(&group, &stop, interrupt, kill_after).await;
        shutdown.abort();
        result
    } else {
        let ignored = config.ignored_deadline_settings();
        if !ignored.is_empty() {
            warn!(?ignored, "No timeout set, deadline settings have no effect");
        }
        let signals = config.relay_signals()?;
        info!(members = group.len(), ?signals, "Running with signal relay");
        run_with_signal_relay(&group, &signals).await
    }
}

/// Log the outcome of a run and turn it into the process exit code.
///
/// Each failure is logged once, on its own line; nothing else reports it.
pub fn report(result: cohort_core::Result<()>) -> ExitCode {
    match result {
        Ok(()) => {
            info!("All commands finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            for failure in err.failures() {
                error!(error = %failure, "Process group failure");
            }
            ExitCode::FAILURE
        }
    }
}

/// Cancel `stop` when the supervisor receives Ctrl+C or SIGTERM.
async fn cancel_on_shutdown(stop: StopContext) {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                return;
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping process group");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, stopping process group");
        }
    }
    stop.cancel();
}
