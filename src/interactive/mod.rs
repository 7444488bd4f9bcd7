//! Interactive command execution.
//!
//! [`run_interactive`] drives one running command until it completes,
//! answering prompts as they appear:
//!
//! 1. poll the command for output without blocking
//! 2. stop if any stream ended
//! 3. scan the latest stdout with the [`PromptRule`]s and send the first
//!    unfired match's response followed by a newline
//! 4. sleep for the [`Backoff`] delay and poll again
//!
//! The run fails with [`Error::Timeout`] once the configured execution time
//! has elapsed. The result is the accumulated stderr when there is any,
//! otherwise the accumulated stdout. Stream content is concatenated exactly
//! as received and only the final text is trimmed.
//!
//! The engine talks to the command through the [`CommandStream`] trait;
//! [`RemoteCommand`] binds it to a live shell.

pub mod backoff;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub use backoff::{Backoff, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL};
pub use prompt::{detect_prompt, DetectionMode, PromptMatch, PromptRule, HIDDEN};

use crate::error::{Error, Result};
use crate::shell::{stream_bytes, CommandHandle, ReceiveOutput, ShellHandle, WinRmClient};

/// Default overall execution time
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Command Stream
// ============================================================================

/// A running command that can be polled and written to
#[async_trait]
pub trait CommandStream: Send + Sync {
    /// Fetch whatever output is available
    async fn poll(&self) -> Result<ReceiveOutput>;

    /// Write `input` to the command's stdin
    async fn send_input(&self, input: &str) -> Result<()>;
}

/// A command running in a remote shell
#[derive(Debug, Clone, Copy)]
pub struct RemoteCommand<'a> {
    client: &'a WinRmClient,
    shell: &'a ShellHandle,
    command: &'a CommandHandle,
}

impl<'a> RemoteCommand<'a> {
    pub fn new(client: &'a WinRmClient, shell: &'a ShellHandle, command: &'a CommandHandle) -> Self {
        Self {
            client,
            shell,
            command,
        }
    }
}

#[async_trait]
impl CommandStream for RemoteCommand<'_> {
    async fn poll(&self) -> Result<ReceiveOutput> {
        self.client
            .receive_output_nonblocking(self.shell, self.command)
            .await
    }

    async fn send_input(&self, input: &str) -> Result<()> {
        self.client.send_input(self.shell, self.command, input).await
    }
}

// ============================================================================
// Options
// ============================================================================

/// Timing of an interactive run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveOptions {
    /// Overall execution time limit
    #[serde(with = "millis", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Base delay between polls
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// Ceiling for the delay between polls
    #[serde(with = "millis", rename = "max_poll_interval_ms")]
    pub max_poll_interval: Duration,
}

impl Default for InteractiveOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_interval: MAX_POLL_INTERVAL,
        }
    }
}

impl InteractiveOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            ..Default::default()
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Output and prompt bookkeeping for one run
#[derive(Debug, Default)]
struct PollState {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    fired: HashSet<String>,
}

impl PollState {
    /// Append the raw stream bytes of one poll
    fn accumulate(&mut self, chunk: &ReceiveOutput) {
        let (stdout, stderr) = stream_bytes(&chunk.fragments);
        self.stdout.extend_from_slice(&stdout);
        self.stderr.extend_from_slice(&stderr);
    }

    fn into_result(self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Run a command to completion, answering prompts from `rules`.
pub async fn run_interactive<S>(
    stream: &S,
    rules: &[PromptRule],
    options: &InteractiveOptions,
) -> Result<String>
where
    S: CommandStream + ?Sized,
{
    let timeout_ms = options.timeout.as_millis() as u64;
    let started = Instant::now();
    let mut backoff = Backoff::new(options.poll_interval).with_max(options.max_poll_interval);
    let mut state = PollState::default();

    debug!(
        timeout_ms,
        poll_interval_ms = options.poll_interval.as_millis() as u64,
        prompts = rules.len(),
        "Starting interactive command"
    );

    loop {
        if started.elapsed() >= options.timeout {
            return Err(Error::timeout("Polling", timeout_ms));
        }

        let chunk = stream.poll().await?;
        state.accumulate(&chunk);

        debug!(
            stdout_len = chunk.output.len(),
            stderr_len = chunk.stderr.len(),
            complete = chunk.is_complete,
            "Received output chunk"
        );

        if chunk.is_complete {
            debug!(exit_code = ?chunk.exit_code, "Command completed");
            break;
        }

        if let Some(found) = detect_prompt(&chunk.output, rules, &state.fired).await {
            let shown = if found.secure {
                HIDDEN
            } else {
                found.response.as_str()
            };
            debug!(rule = found.rule, response = %shown, "Sending prompt response");
            stream.send_input(&format!("{}\n", found.response)).await?;
            state.fired.insert(found.identity);
        }

        if started.elapsed() > options.timeout {
            return Err(Error::timeout("Interactive command", timeout_ms));
        }

        tokio::time::sleep(backoff.next_delay(chunk.has_output())).await;
    }

    Ok(state.into_result())
}
