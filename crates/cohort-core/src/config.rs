//! Run configuration for cohort.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/cohort/config.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`COHORT_*`)
//! 5. CLI arguments (highest priority, applied by the binary)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::group::ProcessGroup;
use crate::process::ManagedCommand;
use crate::signal::{parse_signal, parse_signals};

/// Default log filter level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// One command of the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Parse a whitespace-separated command line. No shell quoting is applied.
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| Error::Config("empty command".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
            env: BTreeMap::new(),
            cwd: None,
        })
    }

    /// Build the not-yet-started process for this command.
    pub fn to_command(&self) -> ManagedCommand {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).envs(&self.env);
        if let Some(ref cwd) = self.cwd {
            command.current_dir(cwd);
        }
        ManagedCommand::new(command)
    }
}

/// Complete description of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub commands: Vec<CommandSpec>,
    /// Deadline for the whole group; `None` runs with the signal relay.
    pub timeout_ms: Option<u64>,
    /// Signal sent when the deadline fires.
    pub interrupt: Option<String>,
    /// Escalation delay between the interrupt and SIGKILL.
    pub kill_after_ms: Option<u64>,
    /// Signals relayed to the group in relay mode.
    pub relay_signals: Vec<String>,
    pub log_level: Option<String>,
}

impl RunConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn kill_after(&self) -> Duration {
        Duration::from_millis(self.kill_after_ms.unwrap_or(0))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn interrupt_signal(&self) -> Result<Option<Signal>> {
        self.interrupt.as_deref().map(parse_signal).transpose()
    }

    pub fn relay_signals(&self) -> Result<Vec<Signal>> {
        parse_signals(&self.relay_signals)
    }

    /// Deadline-only settings that have no effect because no timeout is set.
    pub fn ignored_deadline_settings(&self) -> Vec<&'static str> {
        if self.timeout_ms.is_some() {
            return Vec::new();
        }
        let mut ignored = Vec::new();
        if self.interrupt.is_some() {
            ignored.push("interrupt");
        }
        if self.kill_after_ms.is_some() {
            ignored.push("kill_after");
        }
        ignored
    }

    /// Check that the configuration describes a runnable group.
    pub fn validate(&self) -> Result<()> {
        if self.commands.is_empty() {
            return Err(Error::Config("no commands to run".to_string()));
        }
        if let Some(index) = self.commands.iter().position(|c| c.program.is_empty()) {
            return Err(Error::Config(format!("command {index} has an empty program")));
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::Config("timeout must be greater than 0".to_string()));
        }
        self.interrupt_signal()?;
        self.relay_signals()?;
        Ok(())
    }

    /// Build the process group described by this configuration.
    pub fn build_group(&self) -> ProcessGroup {
        ProcessGroup::from_processes(self.commands.iter().map(CommandSpec::to_command))
    }
}

/// Load configuration with hierarchical resolution.
///
/// The global config file is optional; an explicit `path` must exist.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let mut config = RunConfig::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            merge_config(&mut config, load_config_file(&global_path)?);
        }
    }

    if let Some(path) = path {
        merge_config(&mut config, load_config_file(path)?);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cohort").join("config.json"))
}

/// Read a single JSON config file.
pub fn load_config_file(path: &Path) -> Result<RunConfig> {
    debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Layer `overlay` on top of `base`: set values and non-empty lists win.
pub fn merge_config(base: &mut RunConfig, overlay: RunConfig) {
    if !overlay.commands.is_empty() {
        base.commands = overlay.commands;
    }
    if !overlay.relay_signals.is_empty() {
        base.relay_signals = overlay.relay_signals;
    }
    base.timeout_ms = overlay.timeout_ms.or(base.timeout_ms);
    base.interrupt = overlay.interrupt.or(base.interrupt.take());
    base.kill_after_ms = overlay.kill_after_ms.or(base.kill_after_ms);
    base.log_level = overlay.log_level.or(base.log_level.take());
}

/// Apply `COHORT_*` overrides, reading variables through `lookup`.
pub fn apply_env_overrides<F>(config: &mut RunConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(timeout) = lookup("COHORT_TIMEOUT") {
        config.timeout_ms = Some(duration_millis(parse_duration(&timeout)?));
    }
    if let Some(interrupt) = lookup("COHORT_INTERRUPT") {
        config.interrupt = Some(interrupt);
    }
    if let Some(kill_after) = lookup("COHORT_KILL_AFTER") {
        config.kill_after_ms = Some(duration_millis(parse_duration(&kill_after)?));
    }
    if let Some(level) = lookup("COHORT_LOG") {
        config.log_level = Some(level);
    }
    Ok(())
}

/// Parse a duration such as `500ms`, `2s`, `1.5m` or `1h`. A bare number is
/// taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| Error::Config(format!("invalid duration: {input:?}")))?;
    let seconds = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => {
            return Err(Error::Config(format!(
                "invalid duration unit {other:?} in {input:?}"
            )));
        }
    };
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| Error::Config(format!("invalid duration: {input:?}")))
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn spec(line: &str) -> CommandSpec {
        CommandSpec::parse(line).unwrap()
    }

    #[test]
    fn parses_command_lines() {
        let cmd = spec("  sleep   5 ");
        assert_eq!(cmd.program, "sleep");
        assert_eq!(cmd.args, ["5"]);
        assert!(CommandSpec::parse("   ").is_err());
    }

    #[test]
    fn builds_commands_with_descriptors() {
        let config = RunConfig {
            commands: vec![spec("sleep 5"), spec("sleep 1")],
            ..RunConfig::default()
        };
        let group = config.build_group();
        let names: Vec<String> = group.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["sleep 5", "sleep 1"]);
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("1.5m").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5 days").is_err());
        assert!(parse_duration("ms").is_err());
    }

    #[test]
    fn defaults() {
        let config = RunConfig::default();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.kill_after(), Duration::ZERO);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.interrupt_signal().unwrap(), None);
        assert!(config.relay_signals().unwrap().is_empty());
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert!(RunConfig::default().validate().is_err());

        let mut config = RunConfig {
            commands: vec![spec("true")],
            ..RunConfig::default()
        };
        assert!(config.validate().is_ok());

        config.interrupt = Some("SIGBOGUS".to_string());
        assert!(config.validate().is_err());

        config.interrupt = Some("INT".to_string());
        config.timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.timeout_ms = Some(10);
        config.relay_signals = vec!["nope".to_string()];
        assert!(config.validate().is_err());

        config.relay_signals.clear();
        config.commands.push(CommandSpec {
            program: String::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        });
        assert!(matches!(config.validate(), Err(Error::Config(m)) if m.contains("command 1")));
    }

    #[test]
    fn deadline_settings_without_timeout_are_reported() {
        let mut config = RunConfig {
            commands: vec![spec("true")],
            interrupt: Some("INT".to_string()),
            kill_after_ms: Some(500),
            ..RunConfig::default()
        };
        assert_eq!(config.ignored_deadline_settings(), ["interrupt", "kill_after"]);

        config.timeout_ms = Some(1000);
        assert!(config.ignored_deadline_settings().is_empty());

        assert!(RunConfig::default().ignored_deadline_settings().is_empty());
    }

    #[test]
    fn loads_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "commands": [
                    {"program": "sleep", "args": ["5"]},
                    {"program": "env", "env": {"A": "1"}, "cwd": "/tmp"}
                ],
                "timeout_ms": 2000,
                "interrupt": "SIGINT",
                "kill_after_ms": 1000
            }"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.commands.len(), 2);
        assert_eq!(config.commands[1].env.get("A").map(String::as_str), Some("1"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.interrupt_signal().unwrap(), Some(Signal::SIGINT));
        assert_eq!(config.kill_after(), Duration::from_secs(1));
    }

    #[test]
    fn missing_or_malformed_files_fail() {
        let dir = tempfile::TempDir::new().unwrap();
        let absent = load_config_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(absent, Error::Config(ref m) if m.contains("absent.json")));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let bad = load_config_file(&path).unwrap_err();
        assert!(matches!(bad, Error::Config(ref m) if m.starts_with("Failed to parse") && m.contains("bad.json")));
    }

    #[test]
    fn merge_prefers_overlay_values() {
        let mut base = RunConfig {
            commands: vec![spec("sleep 1")],
            timeout_ms: Some(1000),
            interrupt: Some("INT".to_string()),
            ..RunConfig::default()
        };
        let overlay = RunConfig {
            timeout_ms: Some(5000),
            kill_after_ms: Some(250),
            ..RunConfig::default()
        };
        merge_config(&mut base, overlay);

        assert_eq!(base.commands, [spec("sleep 1")]);
        assert_eq!(base.timeout_ms, Some(5000));
        assert_eq!(base.interrupt.as_deref(), Some("INT"));
        assert_eq!(base.kill_after_ms, Some(250));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("COHORT_TIMEOUT", "2s"),
            ("COHORT_INTERRUPT", "TERM"),
            ("COHORT_KILL_AFTER", "250ms"),
            ("COHORT_LOG", "debug"),
        ]);
        let mut config = RunConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string)).unwrap();

        assert_eq!(config.timeout_ms, Some(2000));
        assert_eq!(config.interrupt_signal().unwrap(), Some(Signal::SIGTERM));
        assert_eq!(config.kill_after_ms, Some(250));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn invalid_env_duration_fails() {
        let mut config = RunConfig::default();
        let result = apply_env_overrides(&mut config, |k| {
            (k == "COHORT_TIMEOUT").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }
}
