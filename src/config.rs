//! Configuration module for winrm-shell
//!
//! Settings come from, in increasing precedence:
//! - Default values
//! - The first configuration file found:
//!   an explicit `--config` path, `$WINRM_SHELL_CONFIG`,
//!   `~/.winrm-shell.toml`, then `./winrm-shell.toml`
//! - Environment variables (`WINRM_HOST`, `WINRM_PORT`, `WINRM_USER`,
//!   `WINRM_PASS`, `WINRM_HTTPS`, `WINRM_INSECURE`)
//! - Command-line arguments, applied by the CLI

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::{AuthMethod, WinRmConfig, WinRmConfigBuilder, DEFAULT_WSMAN_PATH};
use crate::interactive::InteractiveOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionConfig,

    /// Interactive execution settings
    pub interactive: InteractiveConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Target host
    pub host: Option<String>,

    /// Port; 5985 or 5986 depending on `use_ssl` when unset
    pub port: Option<u16>,

    /// Listener path
    pub path: String,

    /// Username (`user`, `DOMAIN\user` or `user@domain`)
    pub username: Option<String>,

    /// Password; prompted for when unset
    pub password: Option<String>,

    /// Use HTTPS
    pub use_ssl: bool,

    /// Verify TLS certificates
    pub verify_ssl: bool,

    /// Force an authentication method
    pub auth_method: Option<AuthMethod>,

    /// HTTP request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// NTLM workstation name
    pub workstation: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            path: DEFAULT_WSMAN_PATH.to_string(),
            username: None,
            password: None,
            use_ssl: false,
            verify_ssl: true,
            auth_method: None,
            timeout_secs: None,
            workstation: None,
        }
    }
}

/// Interactive execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveConfig {
    /// Overall execution timeout in milliseconds
    pub timeout_ms: u64,

    /// Base poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Poll interval ceiling in milliseconds
    pub max_poll_interval_ms: u64,
}

impl Default for InteractiveConfig {
    fn default() -> Self {
        let defaults = InteractiveOptions::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            max_poll_interval_ms: defaults.max_poll_interval.as_millis() as u64,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither `-v` nor `RUST_LOG` is given
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::get_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Config::default(),
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Candidate configuration files, most specific first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(env_config) = std::env::var("WINRM_SHELL_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".winrm-shell.toml"));
        }

        paths.push(PathBuf::from("winrm-shell.toml"));
        paths
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
        };
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("WINRM_HOST") {
            self.connection.host = Some(host);
        }

        if let Ok(port) = std::env::var("WINRM_PORT") {
            if let Ok(p) = port.parse() {
                self.connection.port = Some(p);
            }
        }

        if let Ok(user) = std::env::var("WINRM_USER") {
            self.connection.username = Some(user);
        }

        if let Ok(pass) = std::env::var("WINRM_PASS") {
            self.connection.password = Some(pass);
        }

        if let Ok(https) = std::env::var("WINRM_HTTPS") {
            self.connection.use_ssl = is_truthy(&https);
        }

        if let Ok(insecure) = std::env::var("WINRM_INSECURE") {
            self.connection.verify_ssl = !is_truthy(&insecure);
        }
    }

    /// Build library connection parameters.
    ///
    /// `password` overrides the configured password.
    pub fn to_winrm_config(&self, password: Option<String>) -> Result<WinRmConfig> {
        let conn = &self.connection;
        let Some(host) = conn.host.as_deref() else {
            bail!("No host configured; pass --host or set WINRM_HOST");
        };
        let Some(username) = conn.username.as_deref() else {
            bail!("No username configured; pass --user or set WINRM_USER");
        };
        let password = password.or_else(|| conn.password.clone()).unwrap_or_default();

        let mut builder = WinRmConfigBuilder::new(host)
            .path(conn.path.clone())
            .use_ssl(conn.use_ssl)
            .verify_ssl(conn.verify_ssl)
            .credentials(username, password);

        if let Some(port) = conn.port {
            builder = builder.port(port);
        }
        if let Some(method) = conn.auth_method {
            builder = builder.auth_method(method);
        }
        if let Some(secs) = conn.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(workstation) = &conn.workstation {
            builder = builder.workstation(workstation.clone());
        }

        builder.build().context("Invalid connection settings")
    }

    /// Interactive timing
    pub fn interactive_options(&self) -> InteractiveOptions {
        InteractiveOptions {
            timeout: Duration::from_millis(self.interactive.timeout_ms),
            poll_interval: Duration::from_millis(self.interactive.poll_interval_ms),
            max_poll_interval: Duration::from_millis(self.interactive.max_poll_interval_ms),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
