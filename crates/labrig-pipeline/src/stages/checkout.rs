//! `checkout`: clone the project (once) and check out a revision.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use labrig_core::config::shell_quote;
use labrig_core::process::CommandExecutor;
use serde::Deserialize;
use tracing::info;

use super::default_timeout_secs;
use super::shell::run_command;
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutParams {
    /// Clone URL.
    pub repository: String,

    /// Revision to check out; falls back to the context revision.
    #[serde(default)]
    pub revision: Option<String>,

    /// Checkout directory; falls back to the context work dir.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

pub struct CheckoutStage {
    name: String,
    params: CheckoutParams,
    executor: Arc<dyn CommandExecutor>,
}

impl CheckoutStage {
    pub fn new(name: impl Into<String>, params: CheckoutParams, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            name: name.into(),
            params,
            executor,
        }
    }
}

#[async_trait]
impl Stage for CheckoutStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let dir = match &self.params.directory {
            Some(dir) => dir.clone(),
            None => ctx.require_work_dir()?.to_path_buf(),
        };
        let revision = match &self.params.revision {
            Some(rev) => rev.clone(),
            None => ctx.require_revision()?.to_string(),
        };
        let timeout = self.params.timeout_secs;
        let exec = self.executor.as_ref();
        let quoted_dir = shell_quote(&dir.to_string_lossy());

        if tokio::fs::metadata(dir.join(".git")).await.is_err() {
            let clone = format!("git clone {} {}", shell_quote(&self.params.repository), quoted_dir);
            run_command(&self.name, exec, &clone, None, timeout, false).await?;
        }

        let checkout = format!("git -C {} checkout --quiet {}", quoted_dir, shell_quote(&revision));
        run_command(&self.name, exec, &checkout, None, timeout, false).await?;

        let head = format!("git -C {} rev-parse HEAD", quoted_dir);
        let resolved = run_command(&self.name, exec, &head, None, timeout, false)
            .await?
            .output
            .trim()
            .to_string();
        if resolved.is_empty() {
            return Err(PipelineError::missing("revision"));
        }

        info!(stage = %self.name, dir = %dir.display(), revision = %resolved, "checked out");
        ctx.work_dir = Some(dir);
        ctx.revision = Some(resolved);
        Ok(())
    }
}
