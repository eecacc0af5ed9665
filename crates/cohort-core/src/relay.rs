//! Forward signals received by the supervisor to every group member.

use nix::sys::signal::Signal;
use tokio::signal::unix::{SignalKind, signal};
use tokio_stream::wrappers::SignalStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::group::ProcessGroup;
use crate::process::Process;
use crate::signal::DEFAULT_RELAY_SIGNALS;

/// Start `group`, relaying `signals` to it until every member has exited.
///
/// An empty `signals` slice relays [`DEFAULT_RELAY_SIGNALS`]. Relaying is best
/// effort: delivery failures are logged and never returned. The subscriptions
/// are dropped when this returns, whatever the outcome.
///
/// Signals the supervisor receives before the group has started are
/// forwarded once the members are running.
pub async fn run_with_signal_relay<P: Process>(
    group: &ProcessGroup<P>,
    signals: &[Signal],
) -> Result<()> {
    let signals = if signals.is_empty() {
        &DEFAULT_RELAY_SIGNALS[..]
    } else {
        signals
    };
    let mut subscriptions = subscribe(signals)?;

    if let Err(err) = group.start() {
        let _ = group.kill_all();
        return Err(err);
    }
    info!(?signals, members = group.len(), "Relaying signals to process group");

    let wait = group.wait();
    tokio::pin!(wait);

    loop {
        tokio::select! {
            biased;
            result = &mut wait => {
                debug!("Process group exited, dropping signal subscriptions");
                return result;
            }
            Some((signal, ())) = subscriptions.next() => relay(group, signal),
        }
    }
}

fn subscribe(signals: &[Signal]) -> Result<StreamMap<Signal, SignalStream>> {
    let mut subscriptions = StreamMap::with_capacity(signals.len());
    for &sig in signals {
        let stream = signal(SignalKind::from_raw(sig as i32))
            .map_err(|source| Error::Subscribe { signal: sig, source })?;
        subscriptions.insert(sig, SignalStream::new(stream));
    }
    Ok(subscriptions)
}

fn relay<P: Process>(group: &ProcessGroup<P>, signal: Signal) {
    debug!(?signal, "Relaying signal to process group");
    if let Err(err) = group.signal_all(signal) {
        warn!(?signal, error = %err, "Failed to relay signal to process group");
    }
}
