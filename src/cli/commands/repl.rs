//! Repl command - keep one remote shell open and run commands typed at the
//! terminal

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Input};

use super::CommandContext;
use winrm_shell::session::ReplSession;

/// Arguments for the repl command
#[derive(Parser, Debug, Clone)]
pub struct ReplArgs {
    /// Start in PowerShell mode instead of cmd
    #[arg(long)]
    pub powershell: bool,
}

/// A parsed line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplInput {
    Exit,
    Help,
    Info,
    Reconnect,
    Mode(bool),
    Empty,
    Command(String),
}

impl ReplInput {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => ReplInput::Empty,
            ":exit" | ":quit" | "exit" | "quit" => ReplInput::Exit,
            ":help" => ReplInput::Help,
            ":info" => ReplInput::Info,
            ":reconnect" => ReplInput::Reconnect,
            ":ps" | ":powershell" => ReplInput::Mode(true),
            ":cmd" => ReplInput::Mode(false),
            other => ReplInput::Command(other.to_string()),
        }
    }
}

const HELP: &str = "\
:help        show this help
:info        show session details
:ps          switch to PowerShell
:cmd         switch to cmd
:reconnect   replace the remote shell
:exit        close the shell and quit";

impl ReplArgs {
    /// Execute the repl command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let client = ctx.connect()?;
        let mut session = ReplSession::new(client);
        session
            .start()
            .await
            .with_context(|| format!("Failed to open a shell on {}", ctx.host()))?;

        if let Some(info) = session.session_info() {
            ctx.output.banner(&info.host, &info.shell_id);
        }

        let result = self.run_loop(ctx, &mut session).await;
        session.close().await;
        result.map(|()| 0)
    }

    async fn run_loop(&self, ctx: &CommandContext, session: &mut ReplSession) -> Result<()> {
        let mut powershell = self.powershell;

        loop {
            let prompt = if powershell { "PS" } else { "cmd" };
            let Some(line) = read_line(format!("{} {}", prompt, ctx.host())).await? else {
                return Ok(());
            };

            match ReplInput::parse(&line) {
                ReplInput::Empty => {}
                ReplInput::Exit => return Ok(()),
                ReplInput::Help => eprintln!("{}", HELP),
                ReplInput::Info => match session.session_info() {
                    Some(info) => ctx.output.session_info(&info),
                    None => ctx.output.warning("No active session"),
                },
                ReplInput::Reconnect => match session.reconnect().await {
                    Ok(()) => ctx.output.info("Reconnected"),
                    Err(e) => ctx.output.error(&format!("Reconnect failed: {}", e)),
                },
                ReplInput::Mode(ps) => powershell = ps,
                ReplInput::Command(command) => {
                    let result = if powershell {
                        session.execute_powershell(&command).await?
                    } else {
                        session.execute_command(&command).await?
                    };
                    ctx.output.repl_result(&result);
                }
            }
        }
    }
}

/// Read one line from the terminal; `None` at end of input
async fn read_line(prompt: String) -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(move || {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    })
    .await
    .context("Terminal reader task failed")?;

    match line {
        Ok(line) => Ok(Some(line)),
        Err(dialoguer::Error::IO(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e).context("Failed to read input"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repl_input() {
        assert_eq!(ReplInput::parse("  "), ReplInput::Empty);
        assert_eq!(ReplInput::parse("exit"), ReplInput::Exit);
        assert_eq!(ReplInput::parse(":quit"), ReplInput::Exit);
        assert_eq!(ReplInput::parse(":ps"), ReplInput::Mode(true));
        assert_eq!(ReplInput::parse(":cmd"), ReplInput::Mode(false));
        assert_eq!(
            ReplInput::parse(" dir C:\\ "),
            ReplInput::Command("dir C:\\".to_string())
        );
    }
}
