#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Group operations against real child processes.

use std::os::unix::process::ExitStatusExt;
use std::time::Duration;

use cohort_core::{Error, ManagedCommand, Process, ProcessGroup, Signal};

fn sleep(secs: &str) -> ManagedCommand {
    ManagedCommand::program("sleep", [secs])
}

fn sh(script: &str) -> ManagedCommand {
    ManagedCommand::program("sh", ["-c", script])
}

#[tokio::test]
async fn waits_for_every_member_despite_failures() {
    let group = ProcessGroup::from_processes([sh("exit 3"), sleep("0.3"), sh("exit 5")]);
    group.start().unwrap();

    let err = group.wait().await.unwrap_err();
    let messages: Vec<String> = err.failures().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        ["sh -c exit 3: exit status: 3", "sh -c exit 5: exit status: 5"]
    );

    let codes: Vec<Option<i32>> = group
        .iter()
        .map(|p| p.exit_status().and_then(|s| s.code()))
        .collect();
    assert_eq!(codes, [Some(3), Some(0), Some(5)]);
}

#[tokio::test]
async fn partial_start_leaves_spawnable_members_running() {
    let group = ProcessGroup::from_processes([
        sleep("10"),
        ManagedCommand::program("nonexistent_command_12345", ["x"]),
        sleep("10"),
    ]);

    let err = group.start().unwrap_err();
    assert!(matches!(err, Error::Spawn { ref process, .. } if process == "nonexistent_command_12345 x"));
    assert!(group.members()[0].is_started());
    assert!(group.members()[2].is_started());

    group.kill_all().unwrap();
    for member in [&group.members()[0], &group.members()[2]] {
        let status = member.wait().await.unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
    }
}

#[tokio::test]
async fn signal_all_interrupts_running_members() {
    let group = ProcessGroup::from_processes([sleep("10"), sleep("0.1")]);
    group.start().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The short sleeper has exited (not yet reaped); signalling it is harmless.
    group.signal_all(Signal::SIGINT).unwrap();

    let err = group.wait().await.unwrap_err();
    assert!(err.to_string().starts_with("sleep 10: signal: 2"));
    assert_eq!(group.members()[0].exit_status().unwrap().code(), None);
    assert_eq!(group.members()[1].exit_status().unwrap().code(), Some(0));
}

#[tokio::test]
async fn signalling_reaped_members_is_not_an_error() {
    let group = ProcessGroup::from_processes([sh("exit 0"), sh("exit 0")]);
    group.start().unwrap();
    group.wait().await.unwrap();

    assert!(group.signal_all(Signal::SIGTERM).is_ok());
    assert!(group.kill_all().is_ok());
}

#[tokio::test]
async fn unstarted_group_ignores_signals() {
    let group = ProcessGroup::from_processes([sleep("1"), sleep("1")]);
    assert!(group.signal_all(Signal::SIGTERM).is_ok());
    assert!(group.kill_all().is_ok());
    assert!(group.iter().all(|p| !p.is_started()));
}
