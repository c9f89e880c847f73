//! `shell`: run an arbitrary command, optionally capturing its output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use labrig_core::process::{CommandExecutor, CommandOutcome};
use serde::Deserialize;
use tracing::{info, warn};

use super::default_timeout_secs;
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellParams {
    /// Command template; context placeholders are rendered first.
    pub command: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory to run in; relative paths resolve against the work dir.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Treat a non-zero exit as success.
    #[serde(default)]
    pub allow_failure: bool,

    /// Scratch key that receives the trimmed output.
    #[serde(default)]
    pub capture: Option<String>,
}

pub struct ShellStage {
    name: String,
    params: ShellParams,
    executor: Arc<dyn CommandExecutor>,
}

impl ShellStage {
    pub fn new(name: impl Into<String>, params: ShellParams, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            name: name.into(),
            params,
            executor,
        }
    }
}

#[async_trait]
impl Stage for ShellStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let command = ctx.render(&self.params.command)?;
        let dir = resolve_dir(ctx, self.params.cwd.as_deref());
        let outcome = run_command(
            &self.name,
            self.executor.as_ref(),
            &command,
            dir.as_deref(),
            self.params.timeout_secs,
            self.params.allow_failure,
        )
        .await?;

        if let Some(key) = &self.params.capture {
            ctx.set_scratch(key.clone(), outcome.output.trim());
        }
        Ok(())
    }
}

/// Directory a stage command runs in: `cwd` resolved against the work dir.
pub(crate) fn resolve_dir(ctx: &RunContext, cwd: Option<&Path>) -> Option<PathBuf> {
    match (cwd, ctx.work_dir.as_deref()) {
        (Some(dir), Some(work)) if dir.is_relative() => Some(work.join(dir)),
        (Some(dir), _) => Some(dir.to_path_buf()),
        (None, work) => work.map(Path::to_path_buf),
    }
}

/// Run `command`, turning a non-zero exit into `CommandFailed` unless allowed.
pub(crate) async fn run_command(
    stage: &str,
    executor: &dyn CommandExecutor,
    command: &str,
    dir: Option<&Path>,
    timeout_secs: u64,
    allow_failure: bool,
) -> PipelineResult<CommandOutcome> {
    let outcome = executor.execute(command, dir, timeout_secs).await?;
    if outcome.succeeded() {
        info!(stage, duration_ms = outcome.duration_ms, "command succeeded");
        return Ok(outcome);
    }
    if allow_failure {
        warn!(stage, exit_code = outcome.exit_code, "command failed, failure allowed");
        return Ok(outcome);
    }
    Err(PipelineError::CommandFailed {
        stage: stage.to_string(),
        command: command.to_string(),
        exit_code: outcome.exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrig_core::fakes::ScriptedExecutor;

    fn params(command: &str) -> ShellParams {
        serde_json::from_value(serde_json::json!({ "command": command })).unwrap()
    }

    #[tokio::test]
    async fn test_renders_and_runs_in_work_dir() {
        let exec = Arc::new(ScriptedExecutor::new());
        let stage = ShellStage::new("build", params("make REV={revision}"), exec.clone());
        let mut ctx = RunContext::new().with_work_dir("/work").with_revision("r1");

        stage.execute(&mut ctx).await.unwrap();
        let calls = exec.calls();
        assert_eq!(calls[0].command, "make REV=r1");
        assert_eq!(calls[0].working_dir.as_deref(), Some(Path::new("/work")));
        assert_eq!(calls[0].timeout_secs, 600);
    }

    #[tokio::test]
    async fn test_unknown_placeholder_fails_before_running() {
        let exec = Arc::new(ScriptedExecutor::new());
        let stage = ShellStage::new("bench", params("make bench REV={short_rev}"), exec.clone());
        let mut ctx = RunContext::new().with_work_dir("/work");

        let err = stage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingContextField { ref field } if field == "short_rev"));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_unless_allowed() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("false", 1, "");
        let mut ctx = RunContext::new();

        let strict = ShellStage::new("strict", params("false"), exec.clone());
        let err = strict.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::CommandFailed { exit_code: 1, .. }));

        let mut lenient_params = params("false");
        lenient_params.allow_failure = true;
        let lenient = ShellStage::new("lenient", lenient_params, exec);
        lenient.execute(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_writes_scratch() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("which agent", 0, "/opt/agent.jar\n");
        let mut p = params("which agent");
        p.capture = Some("agent".to_string());
        let stage = ShellStage::new("find agent", p, exec);

        let mut ctx = RunContext::new();
        stage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.scratch("agent"), Some("/opt/agent.jar"));
    }

    #[test]
    fn test_resolve_dir() {
        let ctx = RunContext::new().with_work_dir("/work");
        assert_eq!(resolve_dir(&ctx, None), Some(PathBuf::from("/work")));
        assert_eq!(resolve_dir(&ctx, Some(Path::new("sub"))), Some(PathBuf::from("/work/sub")));
        assert_eq!(resolve_dir(&ctx, Some(Path::new("/abs"))), Some(PathBuf::from("/abs")));
        assert_eq!(resolve_dir(&RunContext::new(), None), None);
    }

    #[test]
    fn test_unknown_param_rejected() {
        let res: Result<ShellParams, _> =
            serde_json::from_value(serde_json::json!({ "command": "x", "bogus": 1 }));
        assert!(res.is_err());
    }
}
