//! `prepare_backend` / `teardown_backend`: delegate to the database preparer.

use std::sync::Arc;

use async_trait::async_trait;
use labrig_core::service::DatabasePreparer;

use crate::context::RunContext;
use crate::error::PipelineResult;
use crate::stage::Stage;

pub struct PrepareBackendStage {
    name: String,
    preparer: Arc<DatabasePreparer>,
}

impl PrepareBackendStage {
    pub fn new(name: impl Into<String>, preparer: Arc<DatabasePreparer>) -> Self {
        Self {
            name: name.into(),
            preparer,
        }
    }
}

#[async_trait]
impl Stage for PrepareBackendStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let started = self.preparer.prepare().await?;
        ctx.set_scratch("backend.start", format!("{started:?}"));
        Ok(())
    }
}

pub struct TeardownBackendStage {
    name: String,
    preparer: Arc<DatabasePreparer>,
}

impl TeardownBackendStage {
    pub fn new(name: impl Into<String>, preparer: Arc<DatabasePreparer>) -> Self {
        Self {
            name: name.into(),
            preparer,
        }
    }
}

#[async_trait]
impl Stage for TeardownBackendStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let stopped = self.preparer.teardown().await?;
        ctx.set_scratch("backend.stop", format!("{stopped:?}"));
        Ok(())
    }
}
