//! Run and powershell commands - execute one command line and print its output

use anyhow::Result;
use clap::Parser;
use std::time::Instant;

use super::CommandContext;
use winrm_shell::runner;

/// Arguments for the run and powershell commands
#[derive(Parser, Debug, Clone)]
pub struct ExecArgs {
    /// Command line or script to execute
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ExecArgs {
    /// The command words joined back into one line
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Execute through `cmd`, or through PowerShell when `powershell` is set
    pub async fn execute(&self, ctx: &mut CommandContext, powershell: bool) -> Result<i32> {
        let client = ctx.connect()?;
        let command = self.command_line();
        ctx.output.info(&format!("Executing on {}: {}", ctx.host(), command));

        let started = Instant::now();
        let output = if powershell {
            runner::run_powershell(&client, &command).await?
        } else {
            runner::run_command(&client, &command).await?
        };

        ctx.output
            .command_output(ctx.host(), &output, started.elapsed());
        Ok(0)
    }
}
