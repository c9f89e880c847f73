//! Observed service state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a supervised service is believed to be.
///
/// The supervisor never owns this state: every transition is backed by an
/// external probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Unknown,
    Starting,
    Active,
    Stopping,
    Inactive,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Starting => "starting",
            ServiceState::Active => "active",
            ServiceState::Stopping => "stopping",
            ServiceState::Inactive => "inactive",
            ServiceState::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
