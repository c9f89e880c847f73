//! Backend supervisor: a detached long-running process behind a TCP port.
//!
//! Start order: validate config, then (a) already healthy, (b) port held by
//! something unhealthy, (c) session already running, and only then launch
//! and poll the readiness marker. Stop kills whatever holds the port.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::marker::{FileReadinessMarker, MarkerStatus, ReadinessMarker};
use super::poll::poll_until;
use super::probe::{BackendProbe, SystemBackendProbe};
use super::state::ServiceState;
use super::{ServiceError, ServiceResult};
use crate::config::{render_template, BackendSettings};
use crate::obs::emit_service_transition;
use crate::process::CommandExecutor;

/// How a successful `start_backend` got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStart {
    /// The health endpoint already answered; nothing was done.
    AlreadyHealthy,
    /// A supervised session already exists; launch skipped.
    SessionRunning,
    /// Launched and confirmed ready on the given poll attempt.
    Launched { attempt: u32 },
}

/// How a successful `stop_backend` got there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStop {
    /// Nothing was listening on the port.
    AlreadyStopped,
    /// These pids were killed and the port was released.
    Killed { pids: Vec<u32> },
}

pub struct BackendSupervisor {
    settings: BackendSettings,
    executor: Arc<dyn CommandExecutor>,
    probe: Arc<dyn BackendProbe>,
    marker: Arc<dyn ReadinessMarker>,
}

impl BackendSupervisor {
    pub fn new(
        settings: BackendSettings,
        executor: Arc<dyn CommandExecutor>,
        probe: Arc<dyn BackendProbe>,
        marker: Arc<dyn ReadinessMarker>,
    ) -> Self {
        Self {
            settings,
            executor,
            probe,
            marker,
        }
    }

    /// Supervisor wired to the real system probes and a file marker.
    pub fn from_settings(settings: BackendSettings, executor: Arc<dyn CommandExecutor>) -> Self {
        let probe = Arc::new(SystemBackendProbe::new(
            executor.clone(),
            settings.health_path.clone(),
            settings.session_list_command.clone(),
            settings.probe_timeout(),
        ));
        let marker = Arc::new(FileReadinessMarker::new(settings.readiness_marker.clone()));
        Self::new(settings, executor, probe, marker)
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn name(&self) -> &str {
        &self.settings.name
    }

    /// Bring the backend to a ready state, or fail with a named error.
    pub async fn start_backend(&self) -> ServiceResult<BackendStart> {
        let port = self.settings.require_port()?;
        let log_path = self.settings.require_log_path()?;
        let host = self.settings.host.as_str();

        if self.probe.is_healthy(host, port).await {
            info!(service = %self.name(), host, port, "backend already healthy");
            emit_service_transition(self.name(), ServiceState::Unknown, ServiceState::Active);
            return Ok(BackendStart::AlreadyHealthy);
        }

        if self.probe.is_port_in_use(host, port).await {
            emit_service_transition(self.name(), ServiceState::Unknown, ServiceState::Failed);
            return Err(ServiceError::PortAlreadyInUse {
                host: host.to_string(),
                port,
            });
        }

        if self.probe.session_exists(&self.settings.session_name).await {
            info!(
                service = %self.name(),
                session = %self.settings.session_name,
                "backend session already running, skipping launch"
            );
            emit_service_transition(self.name(), ServiceState::Unknown, ServiceState::Active);
            return Ok(BackendStart::SessionRunning);
        }

        let launch = self.settings.require_launch_command()?;
        self.marker.clear().await?;
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        emit_service_transition(self.name(), ServiceState::Unknown, ServiceState::Starting);
        let command = self.settings.detached_launch(launch, log_path);
        let outcome = self
            .executor
            .execute(
                &command,
                self.settings.working_dir.as_deref(),
                self.settings.command_timeout_secs,
            )
            .await?;
        if !outcome.succeeded() {
            emit_service_transition(self.name(), ServiceState::Starting, ServiceState::Failed);
            return Err(ServiceError::LaunchFailed {
                service: self.name().to_string(),
                status: format!("launch command exited with code {}", outcome.exit_code),
            });
        }

        self.await_marker().await
    }

    async fn await_marker(&self) -> ServiceResult<BackendStart> {
        let retries = self.settings.retries;
        let delay = self.settings.delay();

        for attempt in 1..=retries {
            match self.marker.consume().await? {
                Some(MarkerStatus::Ready) => {
                    info!(service = %self.name(), attempt, "backend reported ready");
                    emit_service_transition(self.name(), ServiceState::Starting, ServiceState::Active);
                    return Ok(BackendStart::Launched { attempt });
                }
                Some(MarkerStatus::Failed(status)) => {
                    emit_service_transition(self.name(), ServiceState::Starting, ServiceState::Failed);
                    return Err(ServiceError::LaunchFailed {
                        service: self.name().to_string(),
                        status,
                    });
                }
                Some(MarkerStatus::Pending(status)) => {
                    debug!(service = %self.name(), attempt, status = %status, "backend still starting");
                }
                None => {
                    debug!(service = %self.name(), attempt, "readiness marker not written yet");
                }
            }
            tokio::time::sleep(delay).await;
        }

        emit_service_transition(self.name(), ServiceState::Starting, ServiceState::Inactive);
        Err(ServiceError::NotReady {
            service: self.name().to_string(),
            attempts: retries,
        })
    }

    /// Free the backend port, killing whatever process holds it.
    pub async fn stop_backend(&self) -> ServiceResult<BackendStop> {
        let port = self.settings.require_port()?;
        let host = self.settings.host.as_str();

        if !self.probe.is_port_in_use(host, port).await {
            info!(service = %self.name(), port, "backend port already free");
            emit_service_transition(self.name(), ServiceState::Unknown, ServiceState::Inactive);
            return Ok(BackendStop::AlreadyStopped);
        }

        emit_service_transition(self.name(), ServiceState::Active, ServiceState::Stopping);
        let lookup = render_template(&self.settings.pid_lookup_command, &[("port", &port.to_string())]);
        let outcome = self
            .executor
            .execute(&lookup, None, self.settings.command_timeout_secs)
            .await?;
        let pids = parse_pids(&outcome.output);
        if pids.is_empty() {
            emit_service_transition(self.name(), ServiceState::Stopping, ServiceState::Failed);
            return Err(ServiceError::ServerNotStopped {
                port,
                reason: "port is in use but no owning pid was found".to_string(),
            });
        }

        for pid in &pids {
            let kill = render_template(&self.settings.kill_command, &[("pid", &pid.to_string())]);
            let outcome = self
                .executor
                .execute(&kill, None, self.settings.command_timeout_secs)
                .await?;
            if !outcome.succeeded() {
                warn!(pid, exit_code = outcome.exit_code, "kill command exited non-zero");
            }
        }

        let probe = &self.probe;
        let released = poll_until(self.settings.retries, self.settings.delay(), || async move {
            !probe.is_port_in_use(host, port).await
        })
        .await;

        match released {
            Some(_) => {
                info!(service = %self.name(), port, ?pids, "backend stopped");
                emit_service_transition(self.name(), ServiceState::Stopping, ServiceState::Inactive);
                Ok(BackendStop::Killed { pids })
            }
            None => {
                emit_service_transition(self.name(), ServiceState::Stopping, ServiceState::Failed);
                Err(ServiceError::ServerNotStopped {
                    port,
                    reason: format!("port still in use after killing {pids:?}"),
                })
            }
        }
    }

    /// Worst-case time `start_backend` spends polling.
    pub fn start_budget(&self) -> Duration {
        self.settings.delay() * self.settings.retries
    }
}

/// Every distinct pid in `lsof -t` style output, ascending.
///
/// `lsof` lists a pid once per socket, so one holding both the IPv4 and
/// IPv6 listener shows up twice.
fn parse_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}
