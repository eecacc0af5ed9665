//! Cohort Core Library
//!
//! Drives a fixed group of child processes as one unit:
//! - Start, wait for, signal and kill every member, aggregating failures
//! - Run under a deadline, interrupting and then killing the group
//! - Relay signals received by the supervisor to every member
//! - Run configuration and logging setup shared with the `cohort` binary

#[cfg(not(unix))]
compile_error!("cohort-core only supports Unix platforms");

pub mod config;
pub mod deadline;
pub mod error;
pub mod group;
pub mod process;
pub mod relay;
pub mod signal;
pub mod tracing_init;

pub use config::{CommandSpec, RunConfig};
pub use deadline::{StopContext, StopReason, run_with_deadline};
pub use error::{Aggregate, Error, Result, aggregate};
pub use group::ProcessGroup;
pub use nix::sys::signal::Signal;
pub use process::{ManagedCommand, Process, ProcessError};
pub use relay::run_with_signal_relay;
pub use signal::{DEFAULT_RELAY_SIGNALS, parse_signal};
