//! Subcommands module for winrm-shell CLI

pub mod exec;
pub mod interactive;
pub mod repl;

use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Password};

use crate::cli::output::OutputFormatter;
use crate::cli::{Cli, ConnectionArgs};
use winrm_shell::config::Config;
use winrm_shell::shell::WinRmClient;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration with command-line overrides applied
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, mut config: Config) -> Self {
        apply_connection_args(&mut config, &cli.connection);
        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity());

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
        }
    }

    /// Target host as configured
    pub fn host(&self) -> &str {
        self.config.connection.host.as_deref().unwrap_or_default()
    }

    /// Build a client, prompting for the password when none is configured
    pub fn connect(&self) -> Result<WinRmClient> {
        let password = match &self.config.connection.password {
            Some(_) => None,
            None => Some(prompt_password(
                self.config.connection.username.as_deref().unwrap_or_default(),
                self.host(),
            )?),
        };

        let winrm = self.config.to_winrm_config(password)?;
        self.output.debug(&format!(
            "Connecting to {} as {} ({})",
            winrm.endpoint_url(),
            winrm.username,
            winrm.auth_method
        ));
        WinRmClient::new(winrm).context("Failed to create WinRM client")
    }
}

fn apply_connection_args(config: &mut Config, args: &ConnectionArgs) {
    let conn = &mut config.connection;
    if let Some(host) = &args.host {
        conn.host = Some(host.clone());
    }
    if let Some(port) = args.port {
        conn.port = Some(port);
    }
    if let Some(user) = &args.user {
        conn.username = Some(user.clone());
    }
    if args.https {
        conn.use_ssl = true;
    }
    if args.insecure {
        conn.verify_ssl = false;
    }
    if let Some(auth) = args.auth {
        conn.auth_method = Some(auth);
    }
    if let Some(secs) = args.request_timeout {
        conn.timeout_secs = Some(secs);
    }
}

fn prompt_password(username: &str, host: &str) -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Password for {}@{}", username, host))
        .allow_empty_password(true)
        .interact()
        .context("Failed to read password")
}
