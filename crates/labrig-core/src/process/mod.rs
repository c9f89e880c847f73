//! Process runner: external commands under a hard timeout.
//!
//! - [`runner`] - `ProcessRunner`, `CommandExecutor`, `CommandOutcome`
//! - [`error`]  - `ProcessError` / `ProcessResult`

pub mod error;
pub mod runner;

pub use error::{ProcessError, ProcessResult};
pub use runner::{CommandExecutor, CommandOutcome, ProcessRunner};
