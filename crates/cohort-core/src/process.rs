//! Child process handles driven by a [`ProcessGroup`](crate::ProcessGroup).
//!
//! The group only needs a small contract from a process: spawn it, wait for
//! it, signal it and force-terminate it. [`Process`] captures that contract and
//! [`ManagedCommand`] implements it on top of `tokio::process`.

use std::fmt;
use std::future::Future;
use std::process::ExitStatus;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::signal::unix::{SignalKind, signal};
use tracing::debug;

/// Errors reported by a single process handle.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("process already started")]
    AlreadyStarted,

    #[error("process not started")]
    NotStarted,

    /// The process exited before the operation could reach it.
    #[error("process already finished")]
    AlreadyFinished,

    #[error("spawned process has no pid")]
    MissingPid,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Os(#[from] Errno),
}

impl ProcessError {
    /// Returns `true` for the benign "process already finished" condition.
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::AlreadyFinished)
    }
}

/// A child process that can be driven as part of a group.
///
/// Every method takes `&self`: a group signals members while another task is
/// blocked waiting on them, so implementations synchronize internally.
/// `Display` is the descriptor used in error messages.
pub trait Process: fmt::Display + Send + Sync + 'static {
    /// Start the process.
    fn spawn(&self) -> Result<(), ProcessError>;

    /// Whether [`spawn`](Process::spawn) succeeded at some point.
    fn is_started(&self) -> bool;

    /// Wait for the process to exit and reclaim it.
    fn wait(&self) -> impl Future<Output = Result<ExitStatus, ProcessError>> + Send;

    /// Deliver `signal`. Must return [`ProcessError::AlreadyFinished`] if the
    /// process has already exited.
    fn signal(&self, signal: Signal) -> Result<(), ProcessError>;

    /// Force the process to terminate. Same already-finished contract as
    /// [`signal`](Process::signal).
    fn terminate(&self) -> Result<(), ProcessError> {
        self.signal(Signal::SIGKILL)
    }
}

/// A [`Process`] backed by a caller-built `tokio::process::Command`.
///
/// The command is consumed by the first [`spawn`](Process::spawn). Waiting
/// polls the child on every `SIGCHLD` and only reaps it under the child lock,
/// which [`signal`](Process::signal) also holds while it sends to the pid: a
/// reaped pid is never signalled.
#[derive(Debug)]
pub struct ManagedCommand {
    description: String,
    command: Mutex<Option<tokio::process::Command>>,
    child: Mutex<Option<Child>>,
    pid: OnceLock<Pid>,
    status: OnceLock<ExitStatus>,
}

impl ManagedCommand {
    /// Wrap a not-yet-started command.
    pub fn new(command: tokio::process::Command) -> Self {
        let description = describe(command.as_std());
        Self {
            description,
            command: Mutex::new(Some(command)),
            child: Mutex::new(None),
            pid: OnceLock::new(),
            status: OnceLock::new(),
        }
    }

    /// Build a command from a program and its arguments.
    pub fn program<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        Self::new(command)
    }

    /// The pid of the spawned process, if it was started.
    pub fn pid(&self) -> Option<u32> {
        self.pid.get().and_then(|pid| u32::try_from(pid.as_raw()).ok())
    }

    /// The exit status, once the process has been waited on.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status.get().copied()
    }

    /// Reap the child if it has exited, recording its status.
    fn try_reap(&self) -> Result<Option<ExitStatus>, ProcessError> {
        let mut slot = lock(&self.child);
        if let Some(status) = self.status.get() {
            return Ok(Some(*status));
        }
        let child = slot.as_mut().ok_or(ProcessError::NotStarted)?;
        let Some(status) = child.try_wait()? else {
            return Ok(None);
        };
        debug!(process = %self.description, %status, "Process exited");
        let _ = self.status.set(status);
        Ok(Some(status))
    }
}

impl From<tokio::process::Command> for ManagedCommand {
    fn from(command: tokio::process::Command) -> Self {
        Self::new(command)
    }
}

impl From<std::process::Command> for ManagedCommand {
    fn from(command: std::process::Command) -> Self {
        Self::new(command.into())
    }
}

impl fmt::Display for ManagedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl Process for ManagedCommand {
    fn spawn(&self) -> Result<(), ProcessError> {
        let mut command = lock(&self.command)
            .take()
            .ok_or(ProcessError::AlreadyStarted)?;
        let child = command.spawn()?;
        let raw = child.id().ok_or(ProcessError::MissingPid)?;
        let pid = i32::try_from(raw).map_err(|_| ProcessError::MissingPid)?;
        debug!(process = %self.description, pid = raw, "Spawned process");

        *lock(&self.child) = Some(child);
        let _ = self.pid.set(Pid::from_raw(pid));
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.pid.get().is_some()
    }

    async fn wait(&self) -> Result<ExitStatus, ProcessError> {
        if let Some(status) = self.status.get() {
            return Ok(*status);
        }
        if !self.is_started() {
            return Err(ProcessError::NotStarted);
        }
        // Subscribe before the first poll so an exit in between still wakes us.
        let mut exits = signal(SignalKind::child())?;
        loop {
            if let Some(status) = self.try_reap()? {
                return Ok(status);
            }
            if exits.recv().await.is_none() {
                return Err(std::io::Error::other("SIGCHLD stream closed").into());
            }
        }
    }

    fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        let pid = *self.pid.get().ok_or(ProcessError::NotStarted)?;
        let child = lock(&self.child);
        if self.status.get().is_some() {
            return Err(ProcessError::AlreadyFinished);
        }
        let result = deliver(pid, signal);
        drop(child);
        result
    }
}

/// Send `signal` to `pid`, mapping `ESRCH` to [`ProcessError::AlreadyFinished`].
fn deliver(pid: Pid, signal: Signal) -> Result<(), ProcessError> {
    match kill(pid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessError::AlreadyFinished),
        Err(errno) => Err(errno.into()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe(command: &std::process::Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
