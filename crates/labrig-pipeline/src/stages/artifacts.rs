//! `collect_artifacts`: copy measurement output out of the work dir.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::PipelineResult;
use crate::stage::Stage;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectArtifactsParams {
    /// Files or directories relative to the work dir; placeholders are rendered.
    pub paths: Vec<String>,

    /// Destination root; defaults to the context artifacts dir.
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Collect into `<root>/<run_id>` rather than `<root>`.
    #[serde(default = "yes")]
    pub per_run: bool,

    /// Fail when a listed path does not exist.
    #[serde(default)]
    pub required: bool,
}

pub struct CollectArtifactsStage {
    name: String,
    params: CollectArtifactsParams,
}

impl CollectArtifactsStage {
    pub fn new(name: impl Into<String>, params: CollectArtifactsParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[async_trait]
impl Stage for CollectArtifactsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let work_dir = ctx.require_work_dir()?.to_path_buf();
        let root = match &self.params.destination {
            Some(dir) => dir.clone(),
            None => ctx.require_artifacts_dir()?.to_path_buf(),
        };
        let dest = if self.params.per_run {
            root.join(ctx.run_id().to_string())
        } else {
            root
        };
        tokio::fs::create_dir_all(&dest).await?;

        let mut copied = 0u64;
        for path in &self.params.paths {
            let src = work_dir.join(ctx.render(path)?);
            if tokio::fs::metadata(&src).await.is_err() {
                if self.params.required {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("artifact not found: {}", src.display()),
                    )
                    .into());
                }
                warn!(stage = %self.name, path = %src.display(), "artifact missing, skipped");
                continue;
            }
            copied += copy_into(&src, &dest).await?;
        }

        info!(stage = %self.name, files = copied, dest = %dest.display(), "artifacts collected");
        ctx.set_scratch("artifacts.path", dest.to_string_lossy());
        ctx.set_scratch("artifacts.count", copied.to_string());
        Ok(())
    }
}

/// Copy a file or directory tree into `dest_dir`, returning files copied.
async fn copy_into(src: &Path, dest_dir: &Path) -> io::Result<u64> {
    let file_name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no file name: {}", src.display())))?;
    let mut pending = vec![(src.to_path_buf(), dest_dir.join(file_name))];
    let mut copied = 0;

    while let Some((from, to)) = pending.pop() {
        if tokio::fs::metadata(&from).await?.is_dir() {
            tokio::fs::create_dir_all(&to).await?;
            let mut entries = tokio::fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push((entry.path(), to.join(entry.file_name())));
            }
        } else {
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&from, &to).await?;
            copied += 1;
        }
    }
    Ok(copied)
}
