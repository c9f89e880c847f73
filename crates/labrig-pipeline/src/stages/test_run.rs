//! `run_tests`: run the project's test suite and record its exit code.

use std::sync::Arc;

use async_trait::async_trait;
use labrig_core::config::shell_quote;
use labrig_core::process::CommandExecutor;
use serde::Deserialize;
use tracing::info;

use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

fn default_test_timeout_secs() -> u64 {
    3_600
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunTestsParams {
    /// Command template; defaults to `sh <test_script>`.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default = "default_test_timeout_secs")]
    pub timeout_secs: u64,

    /// Record a non-zero exit instead of failing the stage.
    #[serde(default)]
    pub allow_failure: bool,
}

impl Default for RunTestsParams {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_test_timeout_secs(),
            allow_failure: false,
        }
    }
}

pub struct RunTestsStage {
    name: String,
    params: RunTestsParams,
    executor: Arc<dyn CommandExecutor>,
}

impl RunTestsStage {
    pub fn new(name: impl Into<String>, params: RunTestsParams, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            name: name.into(),
            params,
            executor,
        }
    }
}

#[async_trait]
impl Stage for RunTestsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let work_dir = ctx.require_work_dir()?.to_path_buf();
        let command = match &self.params.command {
            Some(template) => ctx.render(template)?,
            None => format!("sh {}", shell_quote(&ctx.require_test_script()?.to_string_lossy())),
        };

        let outcome = self
            .executor
            .execute(&command, Some(&work_dir), self.params.timeout_secs)
            .await?;
        ctx.set_scratch("tests.exit_code", outcome.exit_code.to_string());
        ctx.set_scratch("tests.duration_ms", outcome.duration_ms.to_string());
        info!(stage = %self.name, exit_code = outcome.exit_code, "test suite finished");

        if !outcome.succeeded() && !self.params.allow_failure {
            return Err(PipelineError::CommandFailed {
                stage: self.name.clone(),
                command,
                exit_code: outcome.exit_code,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrig_core::fakes::ScriptedExecutor;
    use std::path::Path;

    fn ctx() -> RunContext {
        let mut ctx = RunContext::new().with_work_dir("/proj");
        ctx.test_script = Some("/proj/run tests.sh".into());
        ctx
    }

    #[tokio::test]
    async fn test_default_command_runs_script() {
        let exec = Arc::new(ScriptedExecutor::new());
        let stage = RunTestsStage::new("tests", RunTestsParams::default(), exec.clone());
        let mut ctx = ctx();

        stage.execute(&mut ctx).await.unwrap();
        let call = &exec.calls()[0];
        assert_eq!(call.command, "sh '/proj/run tests.sh'");
        assert_eq!(call.working_dir.as_deref(), Some(Path::new("/proj")));
        assert_eq!(ctx.scratch("tests.exit_code"), Some("0"));
    }

    #[tokio::test]
    async fn test_failure_recorded_then_raised() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("sh '/proj/run tests.sh'", 2, "1 test failed");
        let stage = RunTestsStage::new("tests", RunTestsParams::default(), exec);
        let mut ctx = ctx();

        let err = stage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::CommandFailed { exit_code: 2, .. }));
        assert_eq!(ctx.scratch("tests.exit_code"), Some("2"));
    }

    #[tokio::test]
    async fn test_allow_failure_keeps_going() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("gradle test -cp a.jar:b.jar", 1, "");
        let params = RunTestsParams {
            command: Some("gradle test -cp {classpath}".to_string()),
            allow_failure: true,
            ..RunTestsParams::default()
        };
        let stage = RunTestsStage::new("tests", params, exec.clone());
        let mut ctx = ctx();
        ctx.classpath = vec!["a.jar".to_string(), "b.jar".to_string()];

        stage.execute(&mut ctx).await.unwrap();
        assert_eq!(exec.commands(), vec!["gradle test -cp a.jar:b.jar"]);
        assert_eq!(ctx.scratch("tests.exit_code"), Some("1"));
    }

    #[tokio::test]
    async fn test_unresolved_classpath_never_runs() {
        let exec = Arc::new(ScriptedExecutor::new());
        let params = RunTestsParams {
            command: Some("java -cp {classpath} org.junit.runner.JUnitCore".to_string()),
            ..RunTestsParams::default()
        };
        let stage = RunTestsStage::new("tests", params, exec.clone());
        let mut ctx = ctx();

        let err = stage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingContextField { ref field } if field == "classpath"));
        assert!(exec.calls().is_empty());
        assert!(ctx.scratch("tests.exit_code").is_none());
    }

    #[tokio::test]
    async fn test_missing_script_is_config_error() {
        let exec = Arc::new(ScriptedExecutor::new());
        let stage = RunTestsStage::new("tests", RunTestsParams::default(), exec.clone());
        let mut ctx = RunContext::new().with_work_dir("/proj");

        let err = stage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingContextField { ref field } if field == "test_script"));
        assert!(exec.calls().is_empty());
    }
}
