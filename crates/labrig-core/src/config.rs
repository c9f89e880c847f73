//! Service settings consumed by the supervisors.
//!
//! Settings are plain serde structs with defaults; reading them from a file
//! is left to the binary. Keys whose absence must be reported at use time
//! (not at parse time) are kept as `Option`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service::{ServiceError, ServiceResult};

/// Settings for the data-store supervisor (a system service).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataStoreSettings {
    /// Service name used in log lines and errors.
    pub service_name: String,

    /// Command that asks the init system to start the service.
    pub start_command: String,

    /// Command that asks the init system to stop the service.
    pub stop_command: String,

    /// Command whose trimmed output is `active` while the service runs.
    pub status_command: String,

    /// Number of liveness probes before giving up.
    pub retries: u32,

    /// Delay between probes (milliseconds).
    pub delay_ms: u64,

    /// Timeout for each start/stop/status command (seconds).
    pub command_timeout_secs: u64,
}

impl Default for DataStoreSettings {
    fn default() -> Self {
        Self {
            service_name: "postgresql".to_string(),
            start_command: "service postgresql start".to_string(),
            stop_command: "service postgresql stop".to_string(),
            status_command: "systemctl is-active postgresql".to_string(),
            retries: 10,
            delay_ms: 1_000,
            command_timeout_secs: 120,
        }
    }
}

impl DataStoreSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Settings for the backend supervisor (a detached long-running process).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    /// Service name used in log lines and errors.
    pub name: String,

    /// Host the backend listens on.
    pub host: String,

    /// Port the backend listens on. Required by `start_backend`.
    pub port: Option<u16>,

    /// File the backend's console output is redirected to. Required by `start_backend`.
    pub log_path: Option<PathBuf>,

    /// Command that runs the backend in the foreground.
    pub launch_command: Option<String>,

    /// Directory the launch command runs in.
    pub working_dir: Option<PathBuf>,

    /// Name of the detached session hosting the backend.
    pub session_name: String,

    /// Template for the detached launch. Placeholders: `{session}`, `{command}`, `{log}`.
    pub session_template: String,

    /// Command listing live sessions; its output is searched for `session_name`.
    pub session_list_command: String,

    /// Path of the HTTP health endpoint.
    pub health_path: String,

    /// File the backend writes its terminal startup status to.
    pub readiness_marker: PathBuf,

    /// Command printing the pids bound to a port. Placeholder: `{port}`.
    pub pid_lookup_command: String,

    /// Command forcibly terminating a pid. Placeholder: `{pid}`.
    pub kill_command: String,

    /// Number of readiness polls before giving up.
    pub retries: u32,

    /// Delay between polls (milliseconds).
    pub delay_ms: u64,

    /// Timeout for each supervisor command (seconds).
    pub command_timeout_secs: u64,

    /// Timeout for a single health or port probe (milliseconds).
    pub probe_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            name: "backend".to_string(),
            host: "127.0.0.1".to_string(),
            port: None,
            log_path: None,
            launch_command: None,
            working_dir: None,
            session_name: "labrig-backend".to_string(),
            session_template: "screen -dmS {session} sh -c {command}".to_string(),
            session_list_command: "screen -ls".to_string(),
            health_path: "/health".to_string(),
            readiness_marker: std::env::temp_dir().join("labrig-backend.status"),
            pid_lookup_command: "lsof -t -i:{port}".to_string(),
            kill_command: "kill -9 {pid}".to_string(),
            retries: 30,
            delay_ms: 2_000,
            command_timeout_secs: 60,
            probe_timeout_ms: 2_000,
        }
    }
}

impl BackendSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// The configured port, or `MissingConfigKey("backend.port")`.
    pub fn require_port(&self) -> ServiceResult<u16> {
        self.port
            .filter(|p| *p != 0)
            .ok_or_else(|| ServiceError::missing("backend.port"))
    }

    /// The configured log path, or `MissingConfigKey("backend.log_path")`.
    pub fn require_log_path(&self) -> ServiceResult<&Path> {
        self.log_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ServiceError::missing("backend.log_path"))
    }

    /// The configured launch command, or `MissingConfigKey("backend.launch_command")`.
    pub fn require_launch_command(&self) -> ServiceResult<&str> {
        self.launch_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::missing("backend.launch_command"))
    }

    /// Build the detached launch command for the given foreground command.
    pub fn detached_launch(&self, command: &str, log_path: &Path) -> String {
        let inner = format!("{} > {} 2>&1", command, shell_quote(&log_path.to_string_lossy()));
        render_template(
            &self.session_template,
            &[
                ("session", &self.session_name),
                ("command", &shell_quote(&inner)),
                ("log", &log_path.to_string_lossy()),
            ],
        )
    }
}

/// Replace every `{key}` in `template` with its value.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
