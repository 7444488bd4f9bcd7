//! One-shot command execution.
//!
//! Each runner creates a shell, runs one command in it and deletes the shell
//! again on every exit path. Deletion failures are logged and never replace
//! the command's own result.

use tracing::debug;

use crate::error::Result;
use crate::interactive::{run_interactive, InteractiveOptions, PromptRule, RemoteCommand};
use crate::shell::{ShellHandle, WinRmClient};

/// How the command line is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Launch {
    Cmd,
    PowerShell,
}

async fn with_shell<T, F, Fut>(client: &WinRmClient, run: F) -> Result<T>
where
    F: FnOnce(ShellHandle) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let shell = client.create_shell().await?;
    let result = run(shell.clone()).await;
    client.delete_shell(&shell).await;
    result
}

async fn run(client: &WinRmClient, command: &str, launch: Launch) -> Result<String> {
    debug!(launch = ?launch, "Running command");
    with_shell(client, |shell| async move {
        let handle = match launch {
            Launch::Cmd => client.execute_command(&shell, command).await?,
            Launch::PowerShell => client.execute_powershell(&shell, command, false).await?,
        };
        client.receive_output(&shell, &handle).await
    })
    .await
}

async fn run_interactive_with(
    client: &WinRmClient,
    command: &str,
    launch: Launch,
    rules: &[PromptRule],
    options: &InteractiveOptions,
) -> Result<String> {
    debug!(launch = ?launch, prompts = rules.len(), "Running interactive command");
    with_shell(client, |shell| async move {
        let handle = match launch {
            Launch::Cmd => client.execute_command(&shell, command).await?,
            Launch::PowerShell => client.execute_powershell(&shell, command, true).await?,
        };
        let stream = RemoteCommand::new(client, &shell, &handle);
        run_interactive(&stream, rules, options).await
    })
    .await
}

/// Run a `cmd` command line and return its output
pub async fn run_command(client: &WinRmClient, command: &str) -> Result<String> {
    run(client, command, Launch::Cmd).await
}

/// Run a PowerShell script and return its output
pub async fn run_powershell(client: &WinRmClient, command: &str) -> Result<String> {
    run(client, command, Launch::PowerShell).await
}

/// Run a `cmd` command line, answering prompts from `rules`
pub async fn run_interactive_command(
    client: &WinRmClient,
    command: &str,
    rules: &[PromptRule],
    options: &InteractiveOptions,
) -> Result<String> {
    run_interactive_with(client, command, Launch::Cmd, rules, options).await
}

/// Run a PowerShell script without `-NonInteractive`, answering prompts
/// from `rules`
pub async fn run_interactive_powershell(
    client: &WinRmClient,
    command: &str,
    rules: &[PromptRule],
    options: &InteractiveOptions,
) -> Result<String> {
    run_interactive_with(client, command, Launch::PowerShell, rules, options).await
}
