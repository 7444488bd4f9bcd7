//! Long-lived shell for read-eval-print use.
//!
//! A [`ReplSession`] keeps one remote shell open across many commands.
//! Command failures are captured in the returned [`ReplCommandResult`] rather
//! than raised, so a prompt loop can keep going after a bad command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::shell::{ShellHandle, WinRmClient};

/// Outcome of one REPL command
#[derive(Debug, Clone, Serialize)]
pub struct ReplCommandResult {
    /// Command output, empty when the command failed
    pub output: String,
    /// Error message when the command failed
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub execution_time: Duration,
}

impl ReplCommandResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot of an open session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub shell_id: String,
    pub host: String,
    pub port: u16,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug)]
struct SessionState {
    shell: ShellHandle,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// One remote shell reused across commands
#[derive(Debug)]
pub struct ReplSession {
    client: WinRmClient,
    state: Option<SessionState>,
}

impl ReplSession {
    pub fn new(client: WinRmClient) -> Self {
        Self {
            client,
            state: None,
        }
    }

    pub fn client(&self) -> &WinRmClient {
        &self.client
    }

    /// Open the remote shell
    pub async fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::InvalidState(
                "REPL session is already active".to_string(),
            ));
        }

        let shell = self.client.create_shell().await?;
        debug!(shell_id = %shell.id(), "REPL session started");

        let now = Utc::now();
        self.state = Some(SessionState {
            shell,
            started_at: now,
            last_activity: now,
        });
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| !s.shell.is_deleted())
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.state.as_ref().map(|s| SessionInfo {
            shell_id: s.shell.id().to_string(),
            host: self.client.config().host.clone(),
            port: self.client.config().port,
            is_active: !s.shell.is_deleted(),
            started_at: s.started_at,
            last_activity: s.last_activity,
        })
    }

    /// Run a `cmd` command line in the session's shell
    pub async fn execute_command(&mut self, command: &str) -> Result<ReplCommandResult> {
        self.execute(command, false).await
    }

    /// Run a PowerShell script in the session's shell
    pub async fn execute_powershell(&mut self, command: &str) -> Result<ReplCommandResult> {
        self.execute(command, true).await
    }

    async fn execute(&mut self, command: &str, powershell: bool) -> Result<ReplCommandResult> {
        let client = &self.client;
        let state = self
            .state
            .as_mut()
            .filter(|s| !s.shell.is_deleted())
            .ok_or_else(|| {
                Error::InvalidState("REPL session is not active. Call start() first.".to_string())
            })?;

        let started = Instant::now();
        let outcome = async {
            let handle = if powershell {
                client.execute_powershell(&state.shell, command, false).await?
            } else {
                client.execute_command(&state.shell, command).await?
            };
            client.receive_output(&state.shell, &handle).await
        }
        .await;

        let timestamp = Utc::now();
        let execution_time = started.elapsed();

        Ok(match outcome {
            Ok(output) => {
                state.last_activity = timestamp;
                ReplCommandResult {
                    output,
                    error: None,
                    timestamp,
                    execution_time,
                }
            }
            Err(e) => {
                debug!(error = %e, "REPL command failed");
                ReplCommandResult {
                    output: String::new(),
                    error: Some(e.to_string()),
                    timestamp,
                    execution_time,
                }
            }
        })
    }

    /// Delete the shell. The session is inactive afterwards even if the
    /// server could not delete it.
    pub async fn close(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        if let Err(e) = self.client.try_delete_shell(&state.shell).await {
            warn!(
                shell_id = %state.shell.id(),
                error = %e,
                "Failed to properly clean up shell session"
            );
        }
    }

    /// Close the current shell, if any, and open a new one
    pub async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        self.start().await
    }
}
