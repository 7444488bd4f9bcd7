//! Remote shell lifecycle.
//!
//! A [`WinRmClient`] creates shells, runs commands in them, collects output,
//! feeds stdin and deletes them again. Shells and commands are represented by
//! cheap cloneable handles that remember whether they are still usable:
//!
//! - a [`ShellHandle`] is dead once [`WinRmClient::try_delete_shell`] succeeded
//! - a [`CommandHandle`] is finished once both stdout and stderr reported `End`
//!
//! Using a dead handle fails with [`Error::InvalidState`] without touching the
//! network.
//!
//! # Example
//!
//! ```rust,ignore
//! use winrm_shell::prelude::*;
//!
//! let client = WinRmClient::new(config)?;
//! let shell = client.create_shell().await?;
//! let command = client.execute_command(&shell, "ipconfig /all").await?;
//! let output = client.receive_output(&shell, &command).await;
//! client.delete_shell(&shell).await;
//! println!("{}", output?);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::connection::{Transport, WinRmConfig};
use crate::error::{Error, Result};
use crate::soap::{self, StreamFragment, StreamName};

// ============================================================================
// Handles
// ============================================================================

/// A remote shell created by [`WinRmClient::create_shell`]
#[derive(Debug, Clone)]
pub struct ShellHandle {
    id: String,
    deleted: Arc<AtomicBool>,
}

impl ShellHandle {
    fn new(id: String) -> Self {
        Self {
            id,
            deleted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Server-assigned shell ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the shell has been deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::InvalidState(format!(
                "Shell {} has already been deleted",
                self.id
            )));
        }
        Ok(())
    }
}

/// A command started in a shell
#[derive(Debug, Clone)]
pub struct CommandHandle {
    id: String,
    shell_id: String,
    stdout_done: Arc<AtomicBool>,
    stderr_done: Arc<AtomicBool>,
}

impl CommandHandle {
    fn new(id: String, shell_id: &str) -> Self {
        Self {
            id,
            shell_id: shell_id.to_string(),
            stdout_done: Arc::new(AtomicBool::new(false)),
            stderr_done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Server-assigned command ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// ID of the shell the command runs in
    pub fn shell_id(&self) -> &str {
        &self.shell_id
    }

    /// Both output streams have ended
    pub fn is_finished(&self) -> bool {
        self.stdout_done.load(Ordering::SeqCst) && self.stderr_done.load(Ordering::SeqCst)
    }

    fn record_ends(&self, fragments: &[StreamFragment]) {
        for fragment in fragments.iter().filter(|f| f.end) {
            match fragment.name {
                StreamName::Stdout => self.stdout_done.store(true, Ordering::SeqCst),
                StreamName::Stderr => self.stderr_done.store(true, Ordering::SeqCst),
                StreamName::Other(_) => {}
            }
        }
    }

    fn ensure_usable(&self, shell: &ShellHandle) -> Result<()> {
        shell.ensure_active()?;
        if self.shell_id != shell.id {
            return Err(Error::InvalidState(format!(
                "Command {} belongs to shell {}, not {}",
                self.id, self.shell_id, shell.id
            )));
        }
        if self.is_finished() {
            return Err(Error::InvalidState(format!(
                "Command {} has already completed",
                self.id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Receive Output
// ============================================================================

/// Result of one non-blocking receive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveOutput {
    /// Trimmed stdout from this call
    pub output: String,
    /// Trimmed stderr from this call
    pub stderr: String,
    /// Some stream reported `End`
    pub is_complete: bool,
    /// Raw fragments in arrival order
    pub fragments: Vec<StreamFragment>,
    /// Exit code, once the server reports the command as done
    pub exit_code: Option<i32>,
}

impl ReceiveOutput {
    /// This call produced stdout or stderr text
    pub fn has_output(&self) -> bool {
        !self.output.is_empty() || !self.stderr.is_empty()
    }
}

/// Concatenate the raw content of non-end fragments per stream.
pub(crate) fn stream_bytes(fragments: &[StreamFragment]) -> (Vec<u8>, Vec<u8>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for fragment in fragments.iter().filter(|f| !f.end) {
        match fragment.name {
            StreamName::Stdout => stdout.extend_from_slice(&fragment.content),
            StreamName::Stderr => stderr.extend_from_slice(&fragment.content),
            StreamName::Other(_) => {}
        }
    }
    (stdout, stderr)
}

/// Decode each stream once, so characters split across fragments survive.
fn collect_text(fragments: &[StreamFragment]) -> (String, String) {
    let (stdout, stderr) = stream_bytes(fragments);
    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

/// Wrap a script in the PowerShell invocation used for every PowerShell
/// command. `-NonInteractive` is left out for interactive runs so prompts
/// reach stdout.
pub fn powershell_command_line(command: &str, interactive: bool) -> String {
    let mut args = vec!["powershell.exe", "-NoProfile"];
    if !interactive {
        args.push("-NonInteractive");
    }
    args.extend([
        "-NoLogo",
        "-ExecutionPolicy",
        "Bypass",
        "-InputFormat",
        "Text",
        "-Command",
        "\"& {",
        command,
        "}\"",
    ]);
    args.join(" ")
}

// ============================================================================
// WinRM Client
// ============================================================================

/// Shell lifecycle operations against one endpoint
#[derive(Debug, Clone)]
pub struct WinRmClient {
    config: Arc<WinRmConfig>,
    transport: Transport,
}

impl WinRmClient {
    /// Create a client for the given connection parameters
    pub fn new(config: WinRmConfig) -> Result<Self> {
        Self::with_config(Arc::new(config))
    }

    /// Create a client sharing already wrapped connection parameters
    pub fn with_config(config: Arc<WinRmConfig>) -> Result<Self> {
        let transport = Transport::new(Arc::clone(&config))?;
        Ok(Self { config, transport })
    }

    /// Connection parameters
    pub fn config(&self) -> &WinRmConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        self.config.endpoint_url()
    }

    /// Create a new remote shell
    pub async fn create_shell(&self) -> Result<ShellHandle> {
        debug!(
            host = %self.config.host,
            port = self.config.port,
            auth = %self.config.auth_method,
            "Creating shell"
        );

        let request = soap::build_create_shell_request(&self.endpoint());
        let response = self.transport.send(&request).await?;
        let shell_id = response.extract_shell_id()?;

        debug!(shell_id = %shell_id, "Shell created");
        Ok(ShellHandle::new(shell_id))
    }

    /// Start `command_line` in the shell exactly as given
    pub async fn execute_command(
        &self,
        shell: &ShellHandle,
        command_line: &str,
    ) -> Result<CommandHandle> {
        shell.ensure_active()?;
        debug!(shell_id = %shell.id(), "Executing command");
        trace!(command = %command_line, "Command line");

        let request = soap::build_command_request(&self.endpoint(), shell.id(), command_line);
        let response = self.transport.send(&request).await?;
        let command_id = response.extract_command_id()?;

        debug!(shell_id = %shell.id(), command_id = %command_id, "Command started");
        Ok(CommandHandle::new(command_id, shell.id()))
    }

    /// Start a PowerShell script in the shell
    pub async fn execute_powershell(
        &self,
        shell: &ShellHandle,
        command: &str,
        interactive: bool,
    ) -> Result<CommandHandle> {
        let command_line = powershell_command_line(command, interactive);
        self.execute_command(shell, &command_line).await
    }

    /// Receive output once, letting the server block until the command
    /// produces output or its operation timeout elapses.
    ///
    /// Returns trimmed stdout when there is any, otherwise trimmed stderr.
    pub async fn receive_output(&self, shell: &ShellHandle, command: &CommandHandle) -> Result<String> {
        command.ensure_usable(shell)?;

        let request = soap::build_receive_request(&self.endpoint(), shell.id(), command.id());
        let response = self.transport.send(&request).await?;
        let fragments = response.extract_streams()?;
        command.record_ends(&fragments);

        let (stdout, stderr) = collect_text(&fragments);
        debug!(
            command_id = %command.id(),
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Received output"
        );

        let stdout = stdout.trim();
        if !stdout.is_empty() {
            return Ok(stdout.to_string());
        }
        Ok(stderr.trim().to_string())
    }

    /// Receive whatever output is available in one call.
    ///
    /// A `w:TimedOut` fault means the server waited its full operation
    /// timeout without output and is reported as an empty poll.
    pub async fn receive_output_nonblocking(
        &self,
        shell: &ShellHandle,
        command: &CommandHandle,
    ) -> Result<ReceiveOutput> {
        command.ensure_usable(shell)?;

        let request = soap::build_receive_request(&self.endpoint(), shell.id(), command.id());
        let response = match self.transport.send(&request).await {
            Err(e) if e.fault_subcode().is_some_and(|s| s.ends_with("TimedOut")) => {
                trace!(command_id = %command.id(), "Receive timed out on the server");
                return Ok(ReceiveOutput::default());
            }
            other => other?,
        };

        if let Some(fault) = response.fault() {
            if fault.is_timed_out() {
                trace!(command_id = %command.id(), "Receive timed out on the server");
                return Ok(ReceiveOutput::default());
            }
            return Err(fault.into());
        }

        let fragments = response.extract_streams()?;
        let exit_code = response
            .extract_command_state()?
            .filter(|state| state.is_done())
            .and_then(|state| state.exit_code);
        command.record_ends(&fragments);

        let (stdout, stderr) = collect_text(&fragments);
        let is_complete = fragments.iter().any(|f| f.end);

        trace!(
            command_id = %command.id(),
            fragments = fragments.len(),
            complete = is_complete,
            "Polled output"
        );

        Ok(ReceiveOutput {
            output: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            is_complete,
            fragments,
            exit_code,
        })
    }

    /// Write `text` to the command's stdin
    pub async fn send_input(
        &self,
        shell: &ShellHandle,
        command: &CommandHandle,
        text: &str,
    ) -> Result<()> {
        command.ensure_usable(shell)?;
        debug!(
            shell_id = %shell.id(),
            command_id = %command.id(),
            bytes = text.len(),
            "Sending input"
        );

        let request =
            soap::build_send_input_request(&self.endpoint(), shell.id(), command.id(), text);
        let response = self.transport.send(&request).await?;
        response.check_fault()
    }

    /// Delete the shell, reporting any failure.
    ///
    /// Deleting an already deleted shell is a no-op.
    pub async fn try_delete_shell(&self, shell: &ShellHandle) -> Result<()> {
        if shell.is_deleted() {
            debug!(shell_id = %shell.id(), "Shell already deleted");
            return Ok(());
        }

        debug!(shell_id = %shell.id(), "Deleting shell");
        let request = soap::build_delete_shell_request(&self.endpoint(), shell.id());
        let response = self.transport.send(&request).await?;
        response.check_fault()?;

        shell.deleted.store(true, Ordering::SeqCst);
        debug!(shell_id = %shell.id(), "Shell deleted");
        Ok(())
    }

    /// Delete the shell on a cleanup path; failures are logged, never returned
    pub async fn delete_shell(&self, shell: &ShellHandle) {
        if let Err(e) = self.try_delete_shell(shell).await {
            warn!(shell_id = %shell.id(), error = %e, "Failed to delete shell");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(name: StreamName, content: &str, end: bool) -> StreamFragment {
        StreamFragment {
            name,
            content: content.as_bytes().to_vec(),
            end,
            command_id: None,
        }
    }

    #[test]
    fn test_powershell_command_line() {
        assert_eq!(
            powershell_command_line("Get-Date", false),
            "powershell.exe -NoProfile -NonInteractive -NoLogo -ExecutionPolicy Bypass \
             -InputFormat Text -Command \"& { Get-Date }\""
        );

        let interactive = powershell_command_line("Read-Host 'Name'", true);
        assert!(!interactive.contains("-NonInteractive"));
        assert!(interactive.starts_with("powershell.exe -NoProfile -NoLogo"));
        assert!(interactive.ends_with("\"& { Read-Host 'Name' }\""));
    }

    #[test]
    fn test_collect_text_skips_end_fragments() {
        let fragments = vec![
            fragment(StreamName::Stdout, "hel", false),
            fragment(StreamName::Stderr, "warn", false),
            fragment(StreamName::Stdout, "lo", false),
            fragment(StreamName::Stdout, "ignored", true),
            fragment(StreamName::Other("pr".into()), "x", false),
        ];
        let (stdout, stderr) = collect_text(&fragments);
        assert_eq!(stdout, "hello");
        assert_eq!(stderr, "warn");
    }

    #[test]
    fn test_collect_text_keeps_split_multibyte_characters() {
        // "é" is 0xC3 0xA9
        let fragments = vec![
            StreamFragment {
                name: StreamName::Stdout,
                content: b"caf\xC3".to_vec(),
                end: false,
                command_id: None,
            },
            StreamFragment {
                name: StreamName::Stdout,
                content: b"\xA9 ok".to_vec(),
                end: false,
                command_id: None,
            },
        ];
        let (stdout, _) = collect_text(&fragments);
        assert_eq!(stdout, "café ok");
    }

    #[test]
    fn test_command_handle_tracks_stream_ends() {
        let shell = ShellHandle::new("S1".to_string());
        let command = CommandHandle::new("C1".to_string(), shell.id());
        assert!(command.ensure_usable(&shell).is_ok());

        command.record_ends(&[fragment(StreamName::Stdout, "", true)]);
        assert!(!command.is_finished());
        assert!(command.ensure_usable(&shell).is_ok());

        command.record_ends(&[fragment(StreamName::Stderr, "", true)]);
        assert!(command.is_finished());
        assert!(matches!(
            command.ensure_usable(&shell),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_handles_share_state_across_clones() {
        let shell = ShellHandle::new("S1".to_string());
        let clone = shell.clone();
        shell.deleted.store(true, Ordering::SeqCst);
        assert!(clone.is_deleted());
        assert!(matches!(clone.ensure_active(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_command_from_other_shell_rejected() {
        let shell = ShellHandle::new("S1".to_string());
        let other = ShellHandle::new("S2".to_string());
        let command = CommandHandle::new("C1".to_string(), other.id());
        assert!(matches!(
            command.ensure_usable(&shell),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_receive_output_has_output() {
        let empty = ReceiveOutput::default();
        assert!(!empty.has_output());

        let with_stderr = ReceiveOutput {
            stderr: "boom".to_string(),
            ..Default::default()
        };
        assert!(with_stderr.has_output());
    }
}
