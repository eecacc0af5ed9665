//! A fixed set of child processes driven as one unit.
//!
//! Every operation visits every member and folds the member outcomes into a
//! single [`Result`] with [`aggregate`]; a failing member never short-circuits
//! the others.

use std::sync::Arc;

use nix::sys::signal::Signal;
use tracing::{debug, info};

use crate::error::{Error, Result, aggregate};
use crate::process::{ManagedCommand, Process};

/// An ordered, immutable group of process handles.
///
/// The group may be started at most once. Callers must not run `wait`
/// concurrently with itself on the same group.
#[derive(Debug)]
pub struct ProcessGroup<P = ManagedCommand> {
    members: Vec<Arc<P>>,
}

impl<P: Process> ProcessGroup<P> {
    /// Create a group from shared handles to not-yet-started processes.
    pub fn new<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Arc<P>>,
    {
        Self {
            members: members.into_iter().collect(),
        }
    }

    /// Create a group that holds the only references to its processes.
    pub fn from_processes<I>(processes: I) -> Self
    where
        I: IntoIterator<Item = P>,
    {
        Self::new(processes.into_iter().map(Arc::new))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The members, in declaration order.
    pub fn members(&self) -> &[Arc<P>] {
        &self.members
    }

    /// Iterate over the members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.members.iter().map(AsRef::as_ref)
    }

    /// Spawn every member in order.
    ///
    /// Keeps going past failures, so members that can start are running when
    /// this returns even if the result is an error. Call
    /// [`kill_all`](Self::kill_all) to clean up after a partial start.
    pub fn start(&self) -> Result<()> {
        info!(members = self.members.len(), "Starting process group");
        aggregate(self.members.iter().map(|member| {
            member.spawn().err().map(|source| Error::Spawn {
                process: member.to_string(),
                source,
            })
        }))
    }

    /// Wait for every member to exit.
    ///
    /// Each member is waited on by its own task and the results are joined in
    /// member order, so one member failing never stops the others from being
    /// reclaimed. Only returns once every member task has finished.
    pub async fn wait(&self) -> Result<()> {
        let handles: Vec<_> = self
            .members
            .iter()
            .map(|member| {
                let member = Arc::clone(member);
                tokio::spawn(async move { member.wait().await })
            })
            .collect();

        let mut slots = Vec::with_capacity(handles.len());
        for (member, handle) in self.members.iter().zip(handles) {
            let process = member.to_string();
            let outcome = match handle.await {
                Ok(Ok(status)) if status.success() => None,
                Ok(Ok(status)) => Some(Error::Exit { process, status }),
                Ok(Err(source)) => Some(Error::Wait { process, source }),
                Err(source) => Some(Error::WaitTask { process, source }),
            };
            slots.push(outcome);
        }

        debug!(members = slots.len(), "Process group finished");
        aggregate(slots)
    }

    /// Deliver `signal` to every started member.
    ///
    /// Members that were never started are skipped, and members that already
    /// exited are not reported.
    pub fn signal_all(&self, signal: Signal) -> Result<()> {
        debug!(?signal, "Signalling process group");
        aggregate(self.members.iter().map(|member| {
            if !member.is_started() {
                return None;
            }
            match member.signal(signal) {
                Ok(()) => None,
                Err(source) if source.is_finished() => None,
                Err(source) => Some(Error::Signal {
                    process: member.to_string(),
                    signal,
                    source,
                }),
            }
        }))
    }

    /// Force every started member to terminate.
    ///
    /// Same skipping rules as [`signal_all`](Self::signal_all); safe to call
    /// after a failed or partial [`start`](Self::start).
    pub fn kill_all(&self) -> Result<()> {
        debug!("Killing process group");
        aggregate(self.members.iter().map(|member| {
            if !member.is_started() {
                return None;
            }
            match member.terminate() {
                Ok(()) => None,
                Err(source) if source.is_finished() => None,
                Err(source) => Some(Error::Kill {
                    process: member.to_string(),
                    source,
                }),
            }
        }))
    }
}

impl<P: Process> FromIterator<P> for ProcessGroup<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::from_processes(iter)
    }
}
