//! In-memory fakes for the supervisor seams (testing only)
//!
//! Provides `ScriptedExecutor`, `SequenceProbe`, `FakeBackendProbe` and
//! `MemoryReadinessMarker`, each recording how often it was called so tests
//! can assert exact probe and command counts.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::process::{CommandExecutor, CommandOutcome, ProcessError, ProcessResult};
use crate::service::{BackendProbe, LivenessProbe, MarkerStatus, ReadinessMarker};

// ---------------------------------------------------------------------------
// Sticky sequences
// ---------------------------------------------------------------------------

/// Yields queued values in order, then repeats the last one forever.
#[derive(Debug)]
struct Sticky<T: Clone> {
    queue: Mutex<VecDeque<T>>,
    fallback: T,
}

impl<T: Clone> Sticky<T> {
    fn new(values: Vec<T>, fallback: T) -> Self {
        Self {
            queue: Mutex::new(values.into()),
            fallback,
        }
    }

    fn next(&self) -> T {
        let mut queue = self.queue.lock().unwrap();
        match queue.len() {
            0 => self.fallback.clone(),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| self.fallback.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Exit { code: i32, output: String },
    TimeOut,
}

/// One command the executor was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

/// Command executor answering from a script keyed by exact command text.
///
/// Unscripted commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Sticky<Scripted>>>,
    calls: Mutex<Vec<ExecutedCommand>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `command` with this exit code and output.
    pub fn respond(&self, command: &str, code: i32, output: &str) {
        self.respond_sequence(command, vec![(code, output)]);
    }

    /// Answer successive runs of `command` in order; the last answer repeats.
    pub fn respond_sequence(&self, command: &str, answers: Vec<(i32, &str)>) {
        let answers = answers
            .into_iter()
            .map(|(code, output)| Scripted::Exit {
                code,
                output: output.to_string(),
            })
            .collect();
        self.install(command, answers);
    }

    /// Make `command` fail with `CommandTimedOut`.
    pub fn time_out(&self, command: &str) {
        self.install(command, vec![Scripted::TimeOut]);
    }

    fn install(&self, command: &str, answers: Vec<Scripted>) {
        let fallback = Scripted::Exit {
            code: 0,
            output: String::new(),
        };
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), Sticky::new(answers, fallback));
    }

    /// Every command executed so far, in order.
    pub fn calls(&self) -> Vec<ExecutedCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// How many times exactly `command` ran.
    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command == command)
            .count()
    }

    /// How many executed commands start with `prefix`.
    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        timeout_secs: u64,
    ) -> ProcessResult<CommandOutcome> {
        self.calls.lock().unwrap().push(ExecutedCommand {
            command: command.to_string(),
            working_dir: working_dir.map(Path::to_path_buf),
            timeout_secs,
        });

        let answer = self
            .scripts
            .lock()
            .unwrap()
            .get(command)
            .map(Sticky::next)
            .unwrap_or(Scripted::Exit {
                code: 0,
                output: String::new(),
            });

        match answer {
            Scripted::Exit { code, output } => Ok(CommandOutcome {
                command: command.to_string(),
                exit_code: code,
                output,
                duration_ms: 0,
            }),
            Scripted::TimeOut => Err(ProcessError::CommandTimedOut {
                command: command.to_string(),
                timeout_secs,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// SequenceProbe
// ---------------------------------------------------------------------------

/// Liveness probe replaying a fixed sequence of answers.
#[derive(Debug)]
pub struct SequenceProbe {
    answers: Sticky<bool>,
    calls: AtomicU32,
}

impl SequenceProbe {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: Sticky::new(answers, false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for SequenceProbe {
    async fn is_active(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.next()
    }
}

// ---------------------------------------------------------------------------
// FakeBackendProbe
// ---------------------------------------------------------------------------

/// Backend probe with scripted answers and per-check call counters.
#[derive(Debug)]
pub struct FakeBackendProbe {
    healthy: Sticky<bool>,
    port_in_use: Sticky<bool>,
    session: Sticky<bool>,
    health_calls: AtomicU32,
    port_calls: AtomicU32,
    session_calls: AtomicU32,
}

impl Default for FakeBackendProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackendProbe {
    /// Everything down: unhealthy, port free, no session.
    pub fn new() -> Self {
        Self {
            healthy: Sticky::new(Vec::new(), false),
            port_in_use: Sticky::new(Vec::new(), false),
            session: Sticky::new(Vec::new(), false),
            health_calls: AtomicU32::new(0),
            port_calls: AtomicU32::new(0),
            session_calls: AtomicU32::new(0),
        }
    }

    pub fn healthy(mut self, answers: Vec<bool>) -> Self {
        self.healthy = Sticky::new(answers, false);
        self
    }

    pub fn port_in_use(mut self, answers: Vec<bool>) -> Self {
        self.port_in_use = Sticky::new(answers, false);
        self
    }

    pub fn session(mut self, answers: Vec<bool>) -> Self {
        self.session = Sticky::new(answers, false);
        self
    }

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn port_calls(&self) -> u32 {
        self.port_calls.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> u32 {
        self.session_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendProbe for FakeBackendProbe {
    async fn is_healthy(&self, _host: &str, _port: u16) -> bool {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.next()
    }

    async fn is_port_in_use(&self, _host: &str, _port: u16) -> bool {
        self.port_calls.fetch_add(1, Ordering::SeqCst);
        self.port_in_use.next()
    }

    async fn session_exists(&self, _session: &str) -> bool {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.session.next()
    }
}

// ---------------------------------------------------------------------------
// MemoryReadinessMarker
// ---------------------------------------------------------------------------

/// Readiness marker replaying a queue of reads; empty once drained.
#[derive(Debug, Default)]
pub struct MemoryReadinessMarker {
    reads: Mutex<VecDeque<Option<MarkerStatus>>>,
    consumes: AtomicU32,
    clears: AtomicU32,
}

impl MemoryReadinessMarker {
    pub fn new(reads: Vec<Option<MarkerStatus>>) -> Self {
        Self {
            reads: Mutex::new(reads.into()),
            consumes: AtomicU32::new(0),
            clears: AtomicU32::new(0),
        }
    }

    /// Marker that reads ready on the `n`th poll.
    pub fn ready_after(n: usize) -> Self {
        let mut reads = vec![None; n.saturating_sub(1)];
        reads.push(Some(MarkerStatus::Ready));
        Self::new(reads)
    }

    pub fn consumes(&self) -> u32 {
        self.consumes.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessMarker for MemoryReadinessMarker {
    async fn consume(&self) -> std::io::Result<Option<MarkerStatus>> {
        self.consumes.fetch_add(1, Ordering::SeqCst);
        Ok(self.reads.lock().unwrap().pop_front().flatten())
    }

    async fn clear(&self) -> std::io::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sticky_repeats_last() {
        let s = Sticky::new(vec![1, 2, 3], 0);
        assert_eq!(s.next(), 1);
        assert_eq!(s.next(), 2);
        assert_eq!(s.next(), 3);
        assert_eq!(s.next(), 3);

        let empty: Sticky<i32> = Sticky::new(vec![], 7);
        assert_eq!(empty.next(), 7);
    }

    #[tokio::test]
    async fn test_scripted_executor_defaults_to_success() {
        let exec = ScriptedExecutor::new();
        let out = exec.execute("anything", None, 5).await.unwrap();
        assert!(out.succeeded());
        assert_eq!(exec.count("anything"), 1);
    }

    #[tokio::test]
    async fn test_ready_after() {
        let marker = MemoryReadinessMarker::ready_after(2);
        assert_eq!(marker.consume().await.unwrap(), None);
        assert_eq!(marker.consume().await.unwrap(), Some(MarkerStatus::Ready));
        assert_eq!(marker.consume().await.unwrap(), None);
        assert_eq!(marker.consumes(), 3);
    }
}
