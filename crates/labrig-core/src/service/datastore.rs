//! Data-store supervisor: start/stop a system service and wait for it.

use std::sync::Arc;

use tracing::{info, warn};

use super::poll::poll_until;
use super::probe::{CommandStatusProbe, LivenessProbe};
use super::state::ServiceState;
use super::ServiceResult;
use crate::config::DataStoreSettings;
use crate::obs::emit_service_transition;
use crate::process::CommandExecutor;

/// Drives the data store between inactive and active.
///
/// `start` and `stop` return a plain boolean: whether the probe confirmed
/// the target state within the retry budget. Only command-level failures
/// (spawn error, command timeout) are errors.
pub struct DataStoreSupervisor {
    settings: DataStoreSettings,
    executor: Arc<dyn CommandExecutor>,
    probe: Arc<dyn LivenessProbe>,
}

impl DataStoreSupervisor {
    pub fn new(
        settings: DataStoreSettings,
        executor: Arc<dyn CommandExecutor>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        Self {
            settings,
            executor,
            probe,
        }
    }

    /// Supervisor whose probe runs the configured status command.
    pub fn with_status_command(settings: DataStoreSettings, executor: Arc<dyn CommandExecutor>) -> Self {
        let probe = Arc::new(CommandStatusProbe::new(
            executor.clone(),
            settings.status_command.clone(),
            settings.command_timeout_secs,
        ));
        Self::new(settings, executor, probe)
    }

    pub fn settings(&self) -> &DataStoreSettings {
        &self.settings
    }

    pub fn name(&self) -> &str {
        &self.settings.service_name
    }

    /// Issue the start command once, then poll until active.
    pub async fn start(&self) -> ServiceResult<bool> {
        emit_service_transition(self.name(), ServiceState::Unknown, ServiceState::Starting);
        self.issue(&self.settings.start_command).await?;
        self.await_state(true, ServiceState::Starting, ServiceState::Active)
            .await
    }

    /// Issue the stop command once, then poll until inactive.
    pub async fn stop(&self) -> ServiceResult<bool> {
        emit_service_transition(self.name(), ServiceState::Active, ServiceState::Stopping);
        self.issue(&self.settings.stop_command).await?;
        self.await_state(false, ServiceState::Stopping, ServiceState::Inactive)
            .await
    }

    async fn issue(&self, command: &str) -> ServiceResult<()> {
        let outcome = self
            .executor
            .execute(command, None, self.settings.command_timeout_secs)
            .await?;
        if !outcome.succeeded() {
            // The probe is the authority on state; a noisy init script is not.
            warn!(
                service = %self.name(),
                command = %command,
                exit_code = outcome.exit_code,
                "service command exited non-zero"
            );
        }
        Ok(())
    }

    async fn await_state(
        &self,
        want_active: bool,
        from: ServiceState,
        target: ServiceState,
    ) -> ServiceResult<bool> {
        let probe = &self.probe;
        let hit = poll_until(self.settings.retries, self.settings.delay(), || async move {
            probe.is_active().await == want_active
        })
        .await;

        match hit {
            Some(attempt) => {
                info!(service = %self.name(), state = %target, attempt, "service reached state");
                emit_service_transition(self.name(), from, target);
                Ok(true)
            }
            None => {
                warn!(
                    service = %self.name(),
                    state = %target,
                    retries = self.settings.retries,
                    "service did not reach state within retry budget"
                );
                emit_service_transition(self.name(), from, ServiceState::Failed);
                Ok(false)
            }
        }
    }
}
