//! CLI module for winrm-shell
//!
//! Argument parsing and subcommand dispatch for the `winrm-shell` binary.

pub mod commands;
pub mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use winrm_shell::connection::AuthMethod;

/// winrm-shell - Run commands on Windows hosts over WinRM
#[derive(Parser, Debug, Clone)]
#[command(name = "winrm-shell")]
#[command(version)]
#[command(about = "Run commands on Windows hosts over WinRM", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "WINRM_SHELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Connection overrides; each one wins over the configuration file and
/// environment
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Target host
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// WinRM port
    #[arg(short = 'P', long, global = true)]
    pub port: Option<u16>,

    /// Username (user, DOMAIN\user or user@domain)
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Use HTTPS
    #[arg(long, global = true)]
    pub https: bool,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Force the authentication method
    #[arg(long, global = true, value_parser = parse_auth_method)]
    pub auth: Option<AuthMethod>,

    /// HTTP request timeout in seconds
    #[arg(long = "request-timeout", global = true)]
    pub request_timeout: Option<u64>,
}

fn parse_auth_method(value: &str) -> Result<AuthMethod, String> {
    value.parse().map_err(|e: winrm_shell::Error| e.to_string())
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a cmd command line
    Run(commands::exec::ExecArgs),

    /// Run a PowerShell script
    #[command(alias = "ps")]
    Powershell(commands::exec::ExecArgs),

    /// Run a command and answer its prompts
    Interactive(commands::interactive::InteractiveArgs),

    /// Open a remote shell and read commands from the terminal
    Repl(commands::repl::ReplArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}
