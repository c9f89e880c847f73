//! Liveness probes: status command, TCP port, HTTP health, session listing.
//!
//! Probes only observe. A probe failure of any kind (timeout, refused
//! connection, command error) reads as "not active", never as an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::process::CommandExecutor;

/// A yes/no liveness signal for a single service.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_active(&self) -> bool;
}

/// Probes a system service by running its status command.
///
/// The service counts as active when the trimmed output is exactly `active`
/// (the `systemctl is-active` convention).
pub struct CommandStatusProbe {
    executor: Arc<dyn CommandExecutor>,
    command: String,
    timeout_secs: u64,
}

impl CommandStatusProbe {
    pub fn new(executor: Arc<dyn CommandExecutor>, command: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            executor,
            command: command.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl LivenessProbe for CommandStatusProbe {
    async fn is_active(&self) -> bool {
        match self.executor.execute(&self.command, None, self.timeout_secs).await {
            Ok(outcome) => outcome.output.trim() == "active",
            Err(e) => {
                debug!(command = %self.command, error = %e, "status probe failed");
                false
            }
        }
    }
}

/// The three independent checks the backend supervisor makes.
#[async_trait]
pub trait BackendProbe: Send + Sync {
    /// Whether the backend answers its health endpoint with a 2xx.
    async fn is_healthy(&self, host: &str, port: u16) -> bool;

    /// Whether anything accepts TCP connections on the port.
    async fn is_port_in_use(&self, host: &str, port: u16) -> bool;

    /// Whether a supervised session with this name is already running.
    async fn session_exists(&self, session: &str) -> bool;
}

/// Probes the real system: reqwest for health, a TCP connect for the port,
/// and the session listing command for sessions.
pub struct SystemBackendProbe {
    http: reqwest::Client,
    executor: Arc<dyn CommandExecutor>,
    health_path: String,
    session_list_command: String,
    probe_timeout: Duration,
}

impl SystemBackendProbe {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        health_path: impl Into<String>,
        session_list_command: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            executor,
            health_path: health_path.into(),
            session_list_command: session_list_command.into(),
            probe_timeout,
        }
    }

    fn health_url(&self, host: &str, port: u16) -> String {
        let path = self.health_path.trim_start_matches('/');
        format!("http://{host}:{port}/{path}")
    }
}

#[async_trait]
impl BackendProbe for SystemBackendProbe {
    async fn is_healthy(&self, host: &str, port: u16) -> bool {
        let url = self.health_url(host, port);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url = %url, error = %e, "health probe failed");
                false
            }
        }
    }

    async fn is_port_in_use(&self, host: &str, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    async fn session_exists(&self, session: &str) -> bool {
        let timeout_secs = self.probe_timeout.as_secs().max(1);
        match self
            .executor
            .execute(&self.session_list_command, None, timeout_secs)
            .await
        {
            Ok(outcome) => outcome.output.lines().any(|line| line_names_session(line, session)),
            Err(e) => {
                debug!(error = %e, "session listing failed");
                false
            }
        }
    }
}

/// Match `session` as a whole token, allowing the `<pid>.<name>` form `screen -ls` prints.
fn line_names_session(line: &str, session: &str) -> bool {
    line.split_whitespace().any(|token| {
        token == session
            || token
                .split_once('.')
                .map(|(pid, name)| pid.chars().all(|c| c.is_ascii_digit()) && name == session)
                .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedExecutor;

    #[test]
    fn test_line_names_session() {
        assert!(line_names_session("\t12345.labrig-backend\t(Detached)", "labrig-backend"));
        assert!(line_names_session("labrig-backend", "labrig-backend"));
        assert!(!line_names_session("\t12345.labrig-backend-2\t(Detached)", "labrig-backend"));
        assert!(!line_names_session("No Sockets found in /run/screen.", "labrig-backend"));
    }

    #[tokio::test]
    async fn test_command_status_probe_reads_active() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("systemctl is-active pg", 0, "active\n");
        let probe = CommandStatusProbe::new(exec.clone(), "systemctl is-active pg", 5);
        assert!(probe.is_active().await);

        exec.respond("systemctl is-active pg", 3, "inactive\n");
        assert!(!probe.is_active().await);
        assert_eq!(exec.count("systemctl is-active pg"), 2);
    }

    #[tokio::test]
    async fn test_port_probe_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = SystemBackendProbe::new(
            Arc::new(ScriptedExecutor::new()),
            "/health",
            "screen -ls",
            Duration::from_millis(500),
        );
        assert!(probe.is_port_in_use("127.0.0.1", port).await);

        drop(listener);
        assert!(!probe.is_port_in_use("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_session_probe_uses_listing_command() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("screen -ls", 0, "There is a screen on:\n\t999.exp-backend\t(Detached)\n");
        let probe = SystemBackendProbe::new(exec.clone(), "/health", "screen -ls", Duration::from_secs(1));

        assert!(probe.session_exists("exp-backend").await);
        assert!(!probe.session_exists("other").await);
    }

    #[test]
    fn test_health_url_normalises_slash() {
        let probe = SystemBackendProbe::new(
            Arc::new(ScriptedExecutor::new()),
            "/actuator/health",
            "screen -ls",
            Duration::from_secs(1),
        );
        assert_eq!(probe.health_url("localhost", 8080), "http://localhost:8080/actuator/health");
    }
}
