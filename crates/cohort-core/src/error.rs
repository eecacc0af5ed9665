//! Error types for the cohort core library.
//!
//! Every group operation fans out over all members and folds the member
//! failures into a single value with [`aggregate`]. An empty set of failures
//! is `Ok(())`, a single failure is returned unchanged and several failures
//! become an [`Error::Aggregate`].

use std::fmt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::deadline::StopReason;
use crate::process::ProcessError;

/// Result type alias using cohort's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for cohort operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A member could not be spawned.
    #[error("{process}: {source}")]
    Spawn {
        process: String,
        #[source]
        source: ProcessError,
    },

    /// A member ran and exited with a failure status.
    #[error("{process}: {status}")]
    Exit { process: String, status: ExitStatus },

    /// Waiting on a member failed.
    #[error("{process}: {source}")]
    Wait {
        process: String,
        #[source]
        source: ProcessError,
    },

    /// The task waiting on a member panicked or was aborted.
    #[error("{process}: wait task failed: {source}")]
    WaitTask {
        process: String,
        #[source]
        source: tokio::task::JoinError,
    },

    /// A signal could not be delivered to a member.
    #[error("{process}: failed to deliver {signal}: {source}")]
    Signal {
        process: String,
        signal: Signal,
        #[source]
        source: ProcessError,
    },

    /// A member could not be force-terminated.
    #[error("{process}: failed to kill: {source}")]
    Kill {
        process: String,
        #[source]
        source: ProcessError,
    },

    /// The run was cut short by its stop context.
    #[error("{0}")]
    Stopped(StopReason),

    /// Subscribing to a supervisor-level signal failed.
    #[error("failed to subscribe to {signal}: {source}")]
    Subscribe {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two or more independent failures.
    #[error("{0}")]
    Aggregate(Aggregate),
}

impl Error {
    /// The individual failures carried by this error.
    ///
    /// An [`Error::Aggregate`] yields its members, any other error yields
    /// itself as the only element.
    pub fn failures(&self) -> &[Self] {
        match self {
            Self::Aggregate(agg) => agg.errors(),
            other => std::slice::from_ref(other),
        }
    }

    /// Returns `true` if this error attributes the end of a run to its stop
    /// context rather than to the processes themselves.
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

/// Several errors from independent operations that carry no single meaning.
///
/// Only constructed through [`aggregate`], which guarantees at least two
/// members.
#[derive(Debug)]
pub struct Aggregate(Vec<Error>);

impl Aggregate {
    /// The member errors, in the order they were reported.
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    /// Consume the aggregate and return its member errors.
    pub fn into_errors(self) -> Vec<Error> {
        self.0
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Fold a sequence of optional errors into one result.
///
/// `None` entries are dropped. No remaining errors is `Ok(())`, exactly one is
/// returned as is, and two or more are wrapped in [`Error::Aggregate`] keeping
/// their relative order.
pub fn aggregate<I>(errors: I) -> Result<()>
where
    I: IntoIterator<Item = Option<Error>>,
{
    let mut errs: Vec<Error> = errors.into_iter().flatten().collect();
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.remove(0)),
        _ => Err(Error::Aggregate(Aggregate(errs))),
    }
}
