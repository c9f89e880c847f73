//! The experiment file: every setting a `labrig` invocation needs, in one TOML document.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use labrig_core::config::{BackendSettings, DataStoreSettings};
use labrig_dispatch::DispatcherSettings;
use labrig_pipeline::{PipelineSpec, RunContext};
use serde::{Deserialize, Serialize};

/// Initial values for the run context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ContextSettings {
    pub work_dir: Option<PathBuf>,
    pub revision: Option<String>,
    pub artifacts_dir: Option<PathBuf>,
    pub agent_path: Option<PathBuf>,
    pub test_script: Option<PathBuf>,
}

impl ContextSettings {
    /// Seed a fresh context from these settings.
    pub fn to_context(&self) -> RunContext {
        let mut ctx = RunContext::new();
        ctx.work_dir = self.work_dir.clone();
        ctx.revision = self.revision.clone();
        ctx.artifacts_dir = self.artifacts_dir.clone();
        ctx.agent_path = self.agent_path.clone();
        ctx.test_script = self.test_script.clone();
        ctx
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentFile {
    pub context: ContextSettings,
    pub datastore: DataStoreSettings,
    pub backend: BackendSettings,
    pub dispatcher: DispatcherSettings,
    pub pipeline: PipelineSpec,
}

impl ExperimentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid experiment file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[context]
work_dir = "/srv/checkout"
artifacts_dir = "/srv/artifacts"
test_script = "run-tests.sh"

[datastore]
retries = 5

[backend]
port = 8080
log_path = "/var/log/backend.log"
launch_command = "java -jar backend.jar"

[dispatcher]
endpoint = "http://collector:9000/events"

[[pipeline.modules]]
name = "measure"
repetitions = 2

[[pipeline.modules.pre]]
kind = "prepare_backend"

[[pipeline.modules.main]]
kind = "run_tests"
params = { allow_failure = true }
"#;

    #[test]
    fn test_parse_full_file() {
        let file = ExperimentFile::parse(SAMPLE).unwrap();
        assert_eq!(file.datastore.retries, 5);
        assert_eq!(file.datastore.delay_ms, 1_000);
        assert_eq!(file.backend.port, Some(8080));
        assert_eq!(file.dispatcher.endpoint, "http://collector:9000/events");
        assert_eq!(file.dispatcher.batch_size, 200);
        assert_eq!(file.pipeline.modules[0].repetitions, 2);
        assert_eq!(file.pipeline.modules[0].main[0].params["allow_failure"], true);

        let ctx = file.context.to_context();
        assert_eq!(ctx.require_work_dir().unwrap(), Path::new("/srv/checkout"));
        assert!(ctx.require_revision().is_err());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let file = ExperimentFile::parse("").unwrap();
        assert_eq!(file, ExperimentFile::default());
        assert!(file.backend.port.is_none());
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(ExperimentFile::parse("[databse]\nretries = 1\n").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let err = ExperimentFile::load(Path::new("/no/such/labrig.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/no/such/labrig.toml"));
    }
}
