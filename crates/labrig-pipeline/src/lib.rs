//! labrig pipeline - sequential experiment execution
//!
//! Provides the execution model that drives one experiment run:
//! - A shared, mutable [`RunContext`] threaded through every stage
//! - [`Stage`]s selected by a stable kind identifier ([`StageKind`])
//! - [`Module`]s running pre stages once, main stages N times, post stages once
//! - A [`Pipeline`] of modules built from a serde [`PipelineSpec`]

pub mod context;
pub mod error;
pub mod module;
pub mod spec;
pub mod stage;
pub mod stages;

// Re-export key types
pub use context::RunContext;
pub use error::{PipelineError, PipelineResult};
pub use module::{Module, ModuleReport, Phase, StageRecord};
pub use spec::{ModuleSpec, Pipeline, PipelineReport, PipelineSpec};
pub use stage::{Stage, StageKind, StageSpec};
pub use stages::{StageFactory, StageServices};
