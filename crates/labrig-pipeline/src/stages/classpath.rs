//! `classpath`: resolve the project classpath from a build tool or a file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use labrig_core::process::CommandExecutor;
use serde::Deserialize;
use tracing::info;

use super::default_timeout_secs;
use super::shell::{resolve_dir, run_command};
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

fn default_separator() -> String {
    ":".to_string()
}

/// Exactly one of `command` or `file` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClasspathParams {
    /// Command whose last non-blank output line is the classpath.
    #[serde(default)]
    pub command: Option<String>,

    /// File holding the classpath, relative to the work dir.
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

enum Source {
    Command(String),
    File(PathBuf),
}

pub struct ClasspathStage {
    name: String,
    source: Source,
    separator: String,
    timeout_secs: u64,
    executor: Arc<dyn CommandExecutor>,
}

impl ClasspathStage {
    pub fn new(
        name: impl Into<String>,
        params: ClasspathParams,
        executor: Arc<dyn CommandExecutor>,
    ) -> PipelineResult<Self> {
        let name = name.into();
        let source = match (params.command, params.file) {
            (Some(command), None) => Source::Command(command),
            (None, Some(file)) => Source::File(file),
            _ => return Err(PipelineError::invalid(&name, "set exactly one of `command` or `file`")),
        };
        if params.separator.is_empty() {
            return Err(PipelineError::invalid(&name, "`separator` must not be empty"));
        }
        Ok(Self {
            name,
            source,
            separator: params.separator,
            timeout_secs: params.timeout_secs,
            executor,
        })
    }
}

#[async_trait]
impl Stage for ClasspathStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let work_dir = ctx.require_work_dir()?.to_path_buf();
        let raw = match &self.source {
            Source::Command(template) => {
                let command = ctx.render(template)?;
                let dir = resolve_dir(ctx, None);
                let outcome = run_command(
                    &self.name,
                    self.executor.as_ref(),
                    &command,
                    dir.as_deref(),
                    self.timeout_secs,
                    false,
                )
                .await?;
                outcome
                    .output
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or_default()
                    .to_string()
            }
            Source::File(file) => tokio::fs::read_to_string(work_dir.join(file)).await?,
        };

        let entries = split_classpath(&raw, &self.separator);
        if entries.is_empty() {
            return Err(PipelineError::missing("classpath"));
        }
        info!(stage = %self.name, entries = entries.len(), "classpath resolved");
        ctx.classpath = entries;
        Ok(())
    }
}

fn split_classpath(raw: &str, separator: &str) -> Vec<String> {
    raw.lines()
        .flat_map(|line| line.split(separator))
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}
