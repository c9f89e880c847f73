//! Process runner behaviour against real child processes.

use std::path::Path;
use std::time::{Duration, Instant};

use labrig_core::process::{CommandExecutor, ProcessError, ProcessRunner};

/// Alive and not a zombie waiting to be reaped.
#[cfg(unix)]
fn is_running(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        let state = stat.rsplit(')').next().and_then(|rest| rest.trim_start().chars().next());
        return !matches!(state, Some('Z') | Some('X'));
    }
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(unix)]
async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..50 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

fn read_pid(path: &Path) -> i32 {
    std::fs::read_to_string(path)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid")
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_kills_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let command = format!("echo $$ > {}; exec sleep 30", pid_file.display());

    let start = Instant::now();
    let err = ProcessRunner::quiet()
        .run(&command, None, 1)
        .await
        .expect_err("command should time out");

    assert!(err.is_timeout());
    assert!(matches!(err, ProcessError::CommandTimedOut { timeout_secs: 1, .. }));
    assert!(start.elapsed() < Duration::from_secs(10));

    let pid = read_pid(&pid_file);
    assert!(wait_until_gone(pid).await, "timed-out process {pid} still running");
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_kills_background_grandchildren() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let command = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

    let err = ProcessRunner::quiet()
        .run(&command, None, 1)
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let pid = read_pid(&pid_file);
    assert!(wait_until_gone(pid).await, "grandchild {pid} survived the timeout");
}

#[tokio::test]
async fn test_high_volume_output_does_not_deadlock() {
    let outcome = ProcessRunner::quiet()
        .run("seq 1 200000; seq 1 50000 1>&2", None, 60)
        .await
        .expect("run failed");

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.output.lines().count(), 250_000);
    assert!(outcome.output.contains("200000"));
}

#[tokio::test]
async fn test_executor_trait_matches_run() {
    let runner = ProcessRunner::quiet();
    let executor: &dyn CommandExecutor = &runner;

    let outcome = executor.execute("printf 'a\\nb\\n'; exit 4", None, 10).await.unwrap();
    assert_eq!(outcome.exit_code, 4);
    assert_eq!(outcome.output.lines().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_zero_timeout_is_clamped() {
    let outcome = ProcessRunner::quiet()
        .run("echo quick", None, 0)
        .await
        .expect("clamped timeout should still allow a quick command");
    assert_eq!(outcome.output.trim(), "quick");
}

#[tokio::test]
async fn test_echo_mode_still_captures_output() {
    let outcome = ProcessRunner::new()
        .run("echo echoed", None, 10)
        .await
        .unwrap();
    assert_eq!(outcome.output.trim(), "echoed");
}
