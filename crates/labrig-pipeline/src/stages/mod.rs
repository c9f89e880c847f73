//! Builtin stages and the factory that builds them from specs.
//!
//! - [`shell`]     - `shell`
//! - [`checkout`]  - `checkout`
//! - [`classpath`] - `classpath`
//! - [`backend`]   - `prepare_backend`, `teardown_backend`
//! - [`test_run`]  - `run_tests`
//! - [`artifacts`] - `collect_artifacts`

pub mod artifacts;
pub mod backend;
pub mod checkout;
pub mod classpath;
pub mod shell;
pub mod test_run;

use std::sync::Arc;

use labrig_core::process::CommandExecutor;
use labrig_core::service::DatabasePreparer;
use serde::de::DeserializeOwned;

use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Stage, StageKind, StageSpec};

pub use artifacts::CollectArtifactsStage;
pub use backend::{PrepareBackendStage, TeardownBackendStage};
pub use checkout::CheckoutStage;
pub use classpath::ClasspathStage;
pub use shell::ShellStage;
pub use test_run::RunTestsStage;

/// Collaborators injected into stages that need them.
#[derive(Clone)]
pub struct StageServices {
    pub executor: Arc<dyn CommandExecutor>,
    pub preparer: Option<Arc<DatabasePreparer>>,
}

impl StageServices {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            preparer: None,
        }
    }

    pub fn with_preparer(mut self, preparer: Arc<DatabasePreparer>) -> Self {
        self.preparer = Some(preparer);
        self
    }

    fn require_preparer(&self, stage: &str) -> PipelineResult<Arc<DatabasePreparer>> {
        self.preparer
            .clone()
            .ok_or_else(|| PipelineError::invalid(stage, "no database preparer configured"))
    }
}

/// Builds stages from [`StageSpec`]s.
#[derive(Clone)]
pub struct StageFactory {
    services: StageServices,
}

impl StageFactory {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &StageServices {
        &self.services
    }

    /// Build the stage a spec describes.
    pub fn build(&self, spec: &StageSpec) -> PipelineResult<Box<dyn Stage>> {
        let kind: StageKind = spec.kind.parse()?;
        let name = spec.display_name();
        let executor = self.services.executor.clone();

        let stage: Box<dyn Stage> = match kind {
            StageKind::Shell => Box::new(ShellStage::new(name.clone(), parse_params(&name, spec)?, executor)),
            StageKind::Checkout => {
                Box::new(CheckoutStage::new(name.clone(), parse_params(&name, spec)?, executor))
            }
            StageKind::Classpath => {
                Box::new(ClasspathStage::new(name.clone(), parse_params(&name, spec)?, executor)?)
            }
            StageKind::PrepareBackend => Box::new(PrepareBackendStage::new(
                name.clone(),
                self.services.require_preparer(&name)?,
            )),
            StageKind::TeardownBackend => Box::new(TeardownBackendStage::new(
                name.clone(),
                self.services.require_preparer(&name)?,
            )),
            StageKind::RunTests => {
                Box::new(RunTestsStage::new(name.clone(), parse_params(&name, spec)?, executor))
            }
            StageKind::CollectArtifacts => {
                Box::new(CollectArtifactsStage::new(name.clone(), parse_params(&name, spec)?))
            }
        };
        Ok(stage)
    }
}

/// Deserialize stage params, treating absent params as an empty table.
fn parse_params<P: DeserializeOwned>(stage: &str, spec: &StageSpec) -> PipelineResult<P> {
    let value = match &spec.params {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| PipelineError::invalid(stage, e))
}

/// Default command timeout for stages (seconds).
pub(crate) fn default_timeout_secs() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrig_core::fakes::ScriptedExecutor;
    use serde_json::json;

    fn factory() -> StageFactory {
        StageFactory::new(StageServices::new(Arc::new(ScriptedExecutor::new())))
    }

    #[test]
    fn test_build_every_kind_without_preparer_needs() {
        let f = factory();
        let shell = f
            .build(&StageSpec::new("shell").with_params(json!({"command": "true"})))
            .unwrap();
        assert_eq!(shell.name(), "shell");

        let tests = f.build(&StageSpec::new("run_tests").named("suite")).unwrap();
        assert_eq!(tests.name(), "suite");

        f.build(&StageSpec::new("collect_artifacts").with_params(json!({"paths": ["out"]})))
            .unwrap();
    }

    #[test]
    fn test_unknown_kind() {
        let err = factory().build(&StageSpec::new("teleport")).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownStageKind { .. }));
    }

    #[test]
    fn test_bad_params_are_invalid() {
        let err = factory()
            .build(&StageSpec::new("shell").with_params(json!({"command": 42})))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidStageParams { ref stage, .. } if stage == "shell"));
    }

    #[test]
    fn test_shell_requires_command() {
        assert!(factory().build(&StageSpec::new("shell")).is_err());
    }

    #[test]
    fn test_backend_stage_needs_preparer() {
        let err = factory().build(&StageSpec::new("prepare_backend")).err().unwrap();
        assert!(err.to_string().contains("no database preparer"));
    }
}
