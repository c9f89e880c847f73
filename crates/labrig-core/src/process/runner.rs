//! Shell command execution with a hard wall-clock timeout.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{ProcessError, ProcessResult};

/// How long output readers may keep draining after the process exited.
///
/// A detached grandchild can inherit the pipes and hold them open forever.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Result of a completed command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The command text as given to the shell.
    pub command: String,

    /// Exit code (128 + signal number when killed by a signal, -1 if unknown).
    pub exit_code: i32,

    /// Merged stdout and stderr, in arrival order.
    pub output: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutcome {
    /// Whether the command exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Anything that can run a shell command to completion.
///
/// Supervisors and stages depend on this seam rather than on
/// [`ProcessRunner`] directly.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` through the shell, optionally inside `working_dir`.
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        timeout_secs: u64,
    ) -> ProcessResult<CommandOutcome>;
}

/// Runs shell commands with merged output and a hard timeout.
///
/// Each command gets its own process group, so a timeout kills the whole
/// tree the shell started, not only the shell.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    echo_output: bool,
}

impl ProcessRunner {
    /// A runner that mirrors every output line to the log.
    pub fn new() -> Self {
        Self { echo_output: true }
    }

    /// A runner that only captures output.
    pub fn quiet() -> Self {
        Self { echo_output: false }
    }

    /// Toggle line mirroring.
    pub fn with_echo(mut self, echo_output: bool) -> Self {
        self.echo_output = echo_output;
        self
    }

    pub fn echoes_output(&self) -> bool {
        self.echo_output
    }

    /// Run `command` and wait for it, for at most `timeout_secs` seconds.
    ///
    /// A `timeout_secs` of zero is clamped to one second. On timeout the
    /// process group is killed and reaped before
    /// [`ProcessError::CommandTimedOut`] is returned; no partial outcome is
    /// produced.
    pub async fn run(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        timeout_secs: u64,
    ) -> ProcessResult<CommandOutcome> {
        let start = Instant::now();
        let timeout_secs = timeout_secs.max(1);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %command, cwd = ?working_dir, timeout_secs, "spawning command");

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);
        let collector = tokio::spawn(collect_output(rx, self.echo_output, label(command)));

        let waited =
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                abort_all(&readers);
                collector.abort();
                return Err(ProcessError::Io {
                    command: command.to_string(),
                    source,
                });
            }
            Err(_elapsed) => {
                terminate(&mut child).await;
                abort_all(&readers);
                collector.abort();
                warn!(command = %command, timeout_secs, "command timed out, process group killed");
                return Err(ProcessError::CommandTimedOut {
                    command: command.to_string(),
                    timeout_secs,
                });
            }
        };

        let output = drain_output(readers, collector).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = exit_code(status);

        debug!(command = %command, exit_code, duration_ms, "command finished");

        Ok(CommandOutcome {
            command: command.to_string(),
            exit_code,
            output,
            duration_ms,
        })
    }
}

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        timeout_secs: u64,
    ) -> ProcessResult<CommandOutcome> {
        self.run(command, working_dir, timeout_secs).await
    }
}

/// Forward raw lines from one stream into the shared channel.
///
/// Lines are decoded lossily so a binary blob cannot stop the drain.
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "output stream closed with error");
                break;
            }
        }
    }
}

async fn collect_output(
    mut rx: mpsc::UnboundedReceiver<String>,
    echo: bool,
    label: String,
) -> String {
    let mut output = String::new();
    while let Some(line) = rx.recv().await {
        if echo {
            info!(command = %label, "{}", line);
        }
        output.push_str(&line);
        output.push('\n');
    }
    output
}

async fn drain_output(readers: Vec<JoinHandle<()>>, mut collector: JoinHandle<String>) -> String {
    if let Ok(Ok(output)) = tokio::time::timeout(OUTPUT_GRACE, &mut collector).await {
        return output;
    }
    // Readers still blocked on an inherited pipe; dropping them closes the
    // channel and lets the collector return what it has.
    abort_all(&readers);
    collector.await.unwrap_or_default()
}

fn abort_all(handles: &[JoinHandle<()>]) {
    for handle in handles {
        handle.abort();
    }
}

/// Kill the child's whole process group and reap the child.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
                let _ = child.wait().await;
                return;
            }
        }
    }
    let _ = child.kill().await;
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn label(command: &str) -> String {
    const MAX: usize = 60;
    match command.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &command[..idx]),
        None => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_succeeded() {
        let outcome = CommandOutcome {
            command: "true".to_string(),
            exit_code: 0,
            output: String::new(),
            duration_ms: 1,
        };
        assert!(outcome.succeeded());

        let failed = CommandOutcome {
            exit_code: 2,
            ..outcome
        };
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_label_truncates_long_commands() {
        let long = "x".repeat(100);
        let l = label(&long);
        assert!(l.ends_with("..."));
        assert_eq!(l.len(), 63);
        assert_eq!(label("echo hi"), "echo hi");
    }

    #[test]
    fn test_runner_echo_flags() {
        assert!(ProcessRunner::new().echoes_output());
        assert!(!ProcessRunner::quiet().echoes_output());
        assert!(ProcessRunner::quiet().with_echo(true).echoes_output());
    }

    #[tokio::test]
    async fn test_run_captures_stdout_and_stderr() {
        let runner = ProcessRunner::quiet();
        let outcome = runner
            .run("echo out; echo err 1>&2", None, 10)
            .await
            .expect("run failed");

        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.output.contains("out"));
        assert!(outcome.output.contains("err"));
        assert_eq!(outcome.command, "echo out; echo err 1>&2");
    }

    #[tokio::test]
    async fn test_run_reports_nonzero_exit() {
        let outcome = ProcessRunner::quiet()
            .run("exit 3", None, 10)
            .await
            .expect("run failed");
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_run_honours_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let outcome = ProcessRunner::quiet()
            .run("cat marker.txt", Some(dir.path()), 10)
            .await
            .expect("run failed");
        assert_eq!(outcome.output.trim(), "here");
    }

    #[tokio::test]
    async fn test_spawn_error_for_missing_working_dir() {
        let err = ProcessRunner::quiet()
            .run("true", Some(Path::new("/definitely/not/here")), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
