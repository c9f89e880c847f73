//! Declarative pipeline definition and the pipeline built from it.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::context::RunContext;
use crate::error::PipelineResult;
use crate::module::{Module, ModuleReport, Phase};
use crate::stage::StageSpec;
use crate::stages::StageFactory;

fn one() -> u32 {
    1
}

/// Declarative description of one module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleSpec {
    pub name: String,

    /// How many times the main stages run.
    #[serde(default = "one")]
    pub repetitions: u32,

    #[serde(default)]
    pub pre: Vec<StageSpec>,

    #[serde(default)]
    pub main: Vec<StageSpec>,

    #[serde(default)]
    pub post: Vec<StageSpec>,
}

impl ModuleSpec {
    /// Build the module, resolving every stage kind up front.
    pub fn build(&self, factory: &StageFactory) -> PipelineResult<Module> {
        let mut module = Module::new(self.name.clone()).with_repetitions(self.repetitions);
        let phases = [(Phase::Pre, &self.pre), (Phase::Main, &self.main), (Phase::Post, &self.post)];
        for (phase, specs) in phases {
            for spec in specs {
                module.add_stage(phase, factory.build(spec)?, spec.continue_on_failure);
            }
        }
        Ok(module)
    }
}

/// Ordered list of modules run over one context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSpec {
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub modules: Vec<ModuleReport>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Stage executions across all modules.
    pub fn stage_count(&self) -> usize {
        self.modules.iter().map(|m| m.stages.len()).sum()
    }
}

/// Modules run in order; the first failing module aborts the run.
pub struct Pipeline {
    modules: Vec<Module>,
}

impl Pipeline {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Build every module; an unknown stage kind fails before anything runs.
    pub fn from_spec(spec: &PipelineSpec, factory: &StageFactory) -> PipelineResult<Self> {
        let modules = spec
            .modules
            .iter()
            .map(|m| m.build(factory))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self::new(modules))
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub async fn run(&self, ctx: &mut RunContext) -> PipelineResult<PipelineReport> {
        let start = Instant::now();
        let span = ctx.span().clone();
        info!(parent: &span, modules = self.modules.len(), "pipeline starting");

        let mut reports = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            reports.push(module.run(ctx).await?);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(parent: &span, duration_ms, "pipeline finished");

        Ok(PipelineReport {
            run_id: ctx.run_id(),
            modules: reports,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_spec_from_toml() {
        let spec: PipelineSpec = toml::from_str(
            r#"
            [[modules]]
            name = "measure"
            repetitions = 3

            [[modules.pre]]
            kind = "checkout"
            params = { repository = "https://example.org/p.git" }

            [[modules.main]]
            kind = "run_tests"
            name = "suite"
            continue_on_failure = true

            [[modules.post]]
            kind = "collect_artifacts"
            params = { paths = ["target/reports"] }
            "#,
        )
        .unwrap();

        let module = &spec.modules[0];
        assert_eq!(module.repetitions, 3);
        assert_eq!(module.pre[0].kind, "checkout");
        assert_eq!(module.pre[0].params["repository"], "https://example.org/p.git");
        assert!(module.main[0].continue_on_failure);
        assert_eq!(module.post[0].params["paths"][0], "target/reports");
    }

    #[test]
    fn test_repetitions_default_to_one() {
        let spec: ModuleSpec = serde_json::from_str(r#"{"name": "m"}"#).unwrap();
        assert_eq!(spec.repetitions, 1);
        assert!(spec.main.is_empty());
    }
}
