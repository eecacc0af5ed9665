//! Run a group under a stop context, escalating from interrupt to kill.
//!
//! [`run_with_deadline`] races the group's natural completion against a
//! [`StopContext`]. When the context fires first the group is optionally
//! interrupted, then given an escalation delay before every member is killed.

use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::group::ProcessGroup;
use crate::process::Process;

/// Why a [`StopContext`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StopReason {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation source for one controlled run.
///
/// Fires when its token is cancelled or its deadline (if any) passes. Clones
/// share the token, so any clone can cancel the run.
#[derive(Debug, Clone, Default)]
pub struct StopContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StopContext {
    /// A context that only fires when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that fires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context driven by an existing cancellation token.
    pub const fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// The deadline, if one was set.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The underlying token, e.g. to cancel from a signal handler task.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Why the context fired, or `None` if it has not.
    pub fn reason(&self) -> Option<StopReason> {
        if self.token.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(StopReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Wait until the context fires.
    pub async fn stopped(&self) -> StopReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => StopReason::Cancelled,
                () = tokio::time::sleep_until(deadline) => StopReason::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                StopReason::Cancelled
            }
        }
    }
}

/// Start `group` and wait for it, stopping it when `stop` fires.
///
/// Outcome precedence, highest first: a failure to deliver `interrupt`, the
/// stop reason, the group's own wait result. The wait result is only returned
/// if `stop` never fired; the group is always fully waited on before this
/// returns.
///
/// With a zero `escalation` nothing beyond `interrupt` is sent. Otherwise the
/// group gets `escalation` to exit after the interrupt before every member is
/// killed.
pub async fn run_with_deadline<P: Process>(
    group: &ProcessGroup<P>,
    stop: &StopContext,
    interrupt: Option<Signal>,
    escalation: Duration,
) -> Result<()> {
    if let Err(err) = group.start() {
        let _ = group.kill_all();
        return Err(err);
    }

    let wait = group.wait();
    tokio::pin!(wait);

    let reason = tokio::select! {
        biased;
        result = &mut wait => return result,
        reason = stop.stopped() => reason,
    };
    info!(%reason, ?interrupt, ?escalation, "Stopping process group");

    let mut attributed = Error::Stopped(reason);
    if let Some(signal) = interrupt {
        if let Err(err) = group.signal_all(signal) {
            warn!(error = %err, ?signal, "Failed to interrupt process group");
            attributed = err;
        }
    }

    if !escalation.is_zero() {
        tokio::select! {
            biased;
            _ = &mut wait => return Err(attributed),
            () = tokio::time::sleep(escalation) => {
                warn!(?escalation, "Process group still running, killing");
                // Members may already be gone; the stop reason stays the cause.
                let _ = group.kill_all();
            }
        }
    }

    let _ = wait.await;
    Err(attributed)
}
