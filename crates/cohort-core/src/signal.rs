//! Signal names and the default relay set.

use nix::sys::signal::Signal;

use crate::error::{Error, Result};

/// Signals relayed to the group when the caller does not name any.
pub const DEFAULT_RELAY_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Parse a signal from its name or number.
///
/// Accepts `SIGINT`, `INT`, `int` and `2` alike.
pub fn parse_signal(name: &str) -> Result<Signal> {
    let trimmed = name.trim();
    if let Ok(number) = trimmed.parse::<i32>() {
        return Signal::try_from(number)
            .map_err(|_| Error::Config(format!("unknown signal number: {number}")));
    }

    let upper = trimmed.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    full.parse::<Signal>()
        .map_err(|_| Error::Config(format!("unknown signal: {name}")))
}

/// Parse a list of signal names, failing on the first unknown one.
pub fn parse_signals<I, S>(names: I) -> Result<Vec<Signal>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| parse_signal(name.as_ref()))
        .collect()
}
