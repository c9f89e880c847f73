//! Module: pre stages once, main stages `repetitions` times, post stages once.

use std::fmt;
use std::time::Instant;

use labrig_core::obs::{
    emit_module_finished, emit_module_started, emit_stage_error, emit_stage_finished,
    emit_stage_started,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// Which part of a module a stage belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pre,
    Main,
    Post,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Main => "main",
            Phase::Post => "post",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub stage: String,
    pub phase: Phase,

    /// 1-based repetition for main stages; always 1 otherwise.
    pub iteration: u32,

    pub duration_ms: u64,

    /// Error text of a tolerated failure.
    pub error: Option<String>,
}

impl StageRecord {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a module run that did not abort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleReport {
    pub module: String,
    pub stages: Vec<StageRecord>,
    pub duration_ms: u64,
}

impl ModuleReport {
    /// Number of stage executions that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }

    /// Number of tolerated failures.
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.passed()).count()
    }
}

struct StageEntry {
    stage: Box<dyn Stage>,
    continue_on_failure: bool,
}

/// Ordered composition of stages.
pub struct Module {
    name: String,
    repetitions: u32,
    pre: Vec<StageEntry>,
    main: Vec<StageEntry>,
    post: Vec<StageEntry>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repetitions: 1,
            pre: Vec::new(),
            main: Vec::new(),
            post: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// How many times the main stages run.
    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn add_stage(&mut self, phase: Phase, stage: Box<dyn Stage>, continue_on_failure: bool) {
        let entry = StageEntry {
            stage,
            continue_on_failure,
        };
        match phase {
            Phase::Pre => self.pre.push(entry),
            Phase::Main => self.main.push(entry),
            Phase::Post => self.post.push(entry),
        }
    }

    pub fn pre(mut self, stage: impl Stage + 'static) -> Self {
        self.add_stage(Phase::Pre, Box::new(stage), false);
        self
    }

    pub fn main(mut self, stage: impl Stage + 'static) -> Self {
        self.add_stage(Phase::Main, Box::new(stage), false);
        self
    }

    pub fn post(mut self, stage: impl Stage + 'static) -> Self {
        self.add_stage(Phase::Post, Box::new(stage), false);
        self
    }

    /// Number of stage executions a full run performs.
    pub fn planned_executions(&self) -> usize {
        self.pre.len() + self.main.len() * self.repetitions as usize + self.post.len()
    }

    /// Run every phase in order over `ctx`.
    ///
    /// A stage failure aborts the rest of the module unless that stage was
    /// added with `continue_on_failure`.
    pub async fn run(&self, ctx: &mut RunContext) -> PipelineResult<ModuleReport> {
        let span = ctx.span().clone();
        self.run_phases(ctx).instrument(span).await
    }

    async fn run_phases(&self, ctx: &mut RunContext) -> PipelineResult<ModuleReport> {
        let start = Instant::now();
        emit_module_started(&self.name, self.repetitions);

        let mut records = Vec::with_capacity(self.planned_executions());
        let outcome = self.run_all(ctx, &mut records).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        emit_module_finished(&self.name, duration_ms, records.len(), outcome.is_ok());
        outcome?;

        Ok(ModuleReport {
            module: self.name.clone(),
            stages: records,
            duration_ms,
        })
    }

    async fn run_all(&self, ctx: &mut RunContext, records: &mut Vec<StageRecord>) -> PipelineResult<()> {
        run_phase(&self.pre, Phase::Pre, 1, ctx, records).await?;
        for iteration in 1..=self.repetitions {
            run_phase(&self.main, Phase::Main, iteration, ctx, records).await?;
        }
        run_phase(&self.post, Phase::Post, 1, ctx, records).await
    }
}

async fn run_phase(
    entries: &[StageEntry],
    phase: Phase,
    iteration: u32,
    ctx: &mut RunContext,
    records: &mut Vec<StageRecord>,
) -> PipelineResult<()> {
    for entry in entries {
        let name = entry.stage.name();
        emit_stage_started(name, phase.as_str(), iteration);
        let start = Instant::now();
        let result = entry.stage.execute(ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        emit_stage_finished(name, phase.as_str(), duration_ms, result.is_ok());

        let mut record = StageRecord {
            stage: name.to_string(),
            phase,
            iteration,
            duration_ms,
            error: None,
        };

        if let Err(err) = result {
            emit_stage_error(name, &err);
            if !entry.continue_on_failure {
                return Err(PipelineError::StageFailed {
                    stage: name.to_string(),
                    phase,
                    source: Box::new(err),
                });
            }
            warn!(stage = %name, phase = %phase, error = %err, "stage failed, continuing");
            record.error = Some(err.to_string());
        } else {
            info!(stage = %name, phase = %phase, iteration, duration_ms, "stage passed");
        }
        records.push(record);
    }
    Ok(())
}
