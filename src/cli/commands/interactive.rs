//! Interactive command - run a command and answer its prompts

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::{Duration, Instant};

use super::CommandContext;
use winrm_shell::interactive::PromptRule;
use winrm_shell::runner;

/// Arguments for the interactive command
#[derive(Parser, Debug, Clone)]
pub struct InteractiveArgs {
    /// Prompt rule as REGEX=RESPONSE (repeatable)
    #[arg(long = "prompt", value_name = "REGEX=RESPONSE", action = clap::ArgAction::Append)]
    pub prompts: Vec<String>,

    /// Prompt rule whose response is hidden from logs (repeatable)
    #[arg(long = "secure-prompt", value_name = "REGEX=RESPONSE", action = clap::ArgAction::Append)]
    pub secure_prompts: Vec<String>,

    /// Overall execution timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Base poll interval in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Run the command as a PowerShell script
    #[arg(long)]
    pub powershell: bool,

    /// Command line or script to execute
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl InteractiveArgs {
    /// Build prompt rules in the order given, plain rules first
    pub fn rules(&self) -> Result<Vec<PromptRule>> {
        let plain = self.prompts.iter().map(|p| (p, false));
        let secure = self.secure_prompts.iter().map(|p| (p, true));

        plain
            .chain(secure)
            .map(|(arg, secure)| parse_prompt(arg).map(|rule| rule.with_secure(secure)))
            .collect()
    }

    /// Execute the interactive command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let rules = self.rules()?;
        let mut options = ctx.config.interactive_options();
        if let Some(ms) = self.timeout {
            options.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_interval {
            options.poll_interval = Duration::from_millis(ms);
        }

        let client = ctx.connect()?;
        let command = self.command.join(" ");
        ctx.output.info(&format!(
            "Executing interactively on {} with {} prompt rule(s): {}",
            ctx.host(),
            rules.len(),
            command
        ));

        let started = Instant::now();
        let output = if self.powershell {
            runner::run_interactive_powershell(&client, &command, &rules, &options).await?
        } else {
            runner::run_interactive_command(&client, &command, &rules, &options).await?
        };

        ctx.output
            .command_output(ctx.host(), &output, started.elapsed());
        Ok(0)
    }
}

/// Split `REGEX=RESPONSE` at the first `=` so responses may contain `=`.
/// A pattern that needs a literal `=` can write it as `\x3D`.
fn parse_prompt(arg: &str) -> Result<PromptRule> {
    let (pattern, response) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Prompt rule '{}' must have the form REGEX=RESPONSE", arg))?;
    PromptRule::regex(pattern, response)
        .with_context(|| format!("Invalid prompt pattern '{}'", pattern))
}
