//! Stage definitions and the stable kind identifiers stages are selected by.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};

/// One named unit of pipeline work.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Human-readable name used in logs and reports.
    fn name(&self) -> &str;

    /// Run against the shared context.
    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()>;
}

/// Builtin stage kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Arbitrary shell command.
    Shell,

    /// Clone and check out a revision.
    Checkout,

    /// Resolve the project classpath.
    Classpath,

    /// Bring up data store and backend.
    PrepareBackend,

    /// Stop backend and data store.
    TeardownBackend,

    /// Run the project's test suite.
    RunTests,

    /// Copy measurement artifacts out of the work dir.
    CollectArtifacts,
}

impl StageKind {
    pub const ALL: [StageKind; 7] = [
        StageKind::Shell,
        StageKind::Checkout,
        StageKind::Classpath,
        StageKind::PrepareBackend,
        StageKind::TeardownBackend,
        StageKind::RunTests,
        StageKind::CollectArtifacts,
    ];

    /// Stable identifier used in pipeline files.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Shell => "shell",
            StageKind::Checkout => "checkout",
            StageKind::Classpath => "classpath",
            StageKind::PrepareBackend => "prepare_backend",
            StageKind::TeardownBackend => "teardown_backend",
            StageKind::RunTests => "run_tests",
            StageKind::CollectArtifacts => "collect_artifacts",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| PipelineError::UnknownStageKind { kind: s.to_string() })
    }
}

/// Declarative description of one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSpec {
    /// Stage kind identifier, e.g. `run_tests`.
    pub kind: String,

    /// Display name; defaults to the kind.
    #[serde(default)]
    pub name: Option<String>,

    /// Log and record a failure instead of aborting the module.
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Kind-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl StageSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            continue_on_failure: false,
            params: serde_json::Value::Null,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn continuing(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    /// Name used for the built stage.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.trim().to_string())
    }
}
