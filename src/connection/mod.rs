//! Connection layer for the WS-Management endpoint.
//!
//! This module owns everything needed to deliver one SOAP request to a
//! Windows host and get one parsed SOAP response back:
//!
//! - [`WinRmConfig`]: immutable connection parameters for a logical session
//! - [`auth`]: username format detection and Basic credentials
//! - [`ntlm`]: NTLMv2 message construction and response computation
//! - [`transport`]: the HTTP transport (Basic or NTLM handshake)
//!
//! # Example
//!
//! ```rust,ignore
//! use winrm_shell::connection::WinRmConfigBuilder;
//!
//! let config = WinRmConfigBuilder::new("windows-host.example.com")
//!     .credentials("DOMAIN\\user", "password")
//!     .use_ssl(true)
//!     .build()?;
//! assert_eq!(config.endpoint_url(), "https://windows-host.example.com:5986/wsman");
//! ```

pub mod auth;
pub mod ntlm;
pub mod transport;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use auth::{detect_auth_method, parse_username, ParsedUsername, UsernameFormat};
pub use transport::Transport;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default WinRM HTTP port
pub const DEFAULT_WINRM_PORT: u16 = 5985;

/// Default WinRM HTTPS port
pub const DEFAULT_WINRM_SSL_PORT: u16 = 5986;

/// Default WS-Management path on the listener
pub const DEFAULT_WSMAN_PATH: &str = "/wsman";

// ============================================================================
// Authentication Method
// ============================================================================

/// How requests are authenticated against the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// `Authorization: Basic` on every request (local accounts)
    Basic,
    /// NTLM challenge-response over a persistent connection (domain accounts)
    Ntlm,
}

impl AuthMethod {
    /// Name used in logs and configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Basic => "basic",
            AuthMethod::Ntlm => "ntlm",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthMethod::Basic),
            "ntlm" | "negotiate" => Ok(AuthMethod::Ntlm),
            other => Err(Error::InvalidConfig(format!(
                "Unknown authentication method '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// WinRM Configuration
// ============================================================================

/// Connection parameters for one logical WinRM session.
///
/// Built through [`WinRmConfigBuilder`] and never mutated afterwards; clients
/// share it behind an `Arc`.
#[derive(Clone)]
pub struct WinRmConfig {
    /// Target hostname or IP address
    pub host: String,
    /// WinRM port (default: 5985 for HTTP, 5986 for HTTPS)
    pub port: u16,
    /// Listener path
    pub path: String,
    /// Use HTTPS instead of HTTP
    pub use_ssl: bool,
    /// Verify TLS certificates
    pub verify_ssl: bool,
    /// Username exactly as supplied (`user`, `DOMAIN\user` or `user@domain`)
    pub username: String,
    /// Password
    pub password: SecretString,
    /// Resolved authentication method
    pub auth_method: AuthMethod,
    /// Per-request HTTP timeout
    pub timeout: Option<Duration>,
    /// Workstation name announced in NTLM messages
    pub workstation: String,
}

impl WinRmConfig {
    /// Get the WinRM endpoint URL
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }

    /// The username split into user and domain parts
    pub fn parsed_username(&self) -> ParsedUsername {
        parse_username(&self.username)
    }
}

impl fmt::Debug for WinRmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WinRmConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("use_ssl", &self.use_ssl)
            .field("verify_ssl", &self.verify_ssl)
            .field("username", &self.username)
            .field("auth_method", &self.auth_method)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WinRM Configuration Builder
// ============================================================================

/// Builder for [`WinRmConfig`]
#[derive(Debug)]
pub struct WinRmConfigBuilder {
    host: String,
    port: Option<u16>,
    path: String,
    use_ssl: bool,
    verify_ssl: bool,
    username: String,
    password: SecretString,
    auth_method: Option<AuthMethod>,
    timeout: Option<Duration>,
    workstation: Option<String>,
}

impl WinRmConfigBuilder {
    /// Create a new builder for a host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            path: DEFAULT_WSMAN_PATH.to_string(),
            use_ssl: false,
            verify_ssl: true,
            username: String::new(),
            password: SecretString::from(String::new()),
            auth_method: None,
            timeout: None,
            workstation: None,
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the listener path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enable HTTPS
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Set TLS certificate verification
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// Set username and password
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = SecretString::from(password.into());
        self
    }

    /// Force an authentication method instead of deriving it from the username
    pub fn auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Set the per-request HTTP timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the NTLM workstation name
    pub fn workstation(mut self, workstation: impl Into<String>) -> Self {
        self.workstation = Some(workstation.into());
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<WinRmConfig> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }
        if self.username.is_empty() {
            return Err(Error::InvalidConfig("username must not be empty".to_string()));
        }

        let port = self.port.unwrap_or(if self.use_ssl {
            DEFAULT_WINRM_SSL_PORT
        } else {
            DEFAULT_WINRM_PORT
        });

        let auth_method = self
            .auth_method
            .unwrap_or_else(|| detect_auth_method(&self.username));

        let workstation = self.workstation.unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_uppercase())
                .unwrap_or_else(|_| "WORKSTATION".to_string())
        });

        let config = WinRmConfig {
            host: self.host,
            port,
            path: self.path,
            use_ssl: self.use_ssl,
            verify_ssl: self.verify_ssl,
            username: self.username,
            password: self.password,
            auth_method,
            timeout: self.timeout,
            workstation,
        };

        url::Url::parse(&config.endpoint_url())
            .map_err(|e| Error::InvalidConfig(format!("Invalid endpoint: {}", e)))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winrm_config_endpoint() {
        let config = WinRmConfigBuilder::new("winserver.example.com")
            .credentials("admin", "pw")
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint_url(),
            "http://winserver.example.com:5985/wsman"
        );

        let ssl_config = WinRmConfigBuilder::new("winserver.example.com")
            .credentials("admin", "pw")
            .use_ssl(true)
            .build()
            .unwrap();
        assert_eq!(
            ssl_config.endpoint_url(),
            "https://winserver.example.com:5986/wsman"
        );
    }

    #[test]
    fn test_builder_resolves_auth_method() {
        let local = WinRmConfigBuilder::new("h")
            .credentials("Administrator", "pw")
            .build()
            .unwrap();
        assert_eq!(local.auth_method, AuthMethod::Basic);

        let domain = WinRmConfigBuilder::new("h")
            .credentials("CORP\\alice", "pw")
            .build()
            .unwrap();
        assert_eq!(domain.auth_method, AuthMethod::Ntlm);

        let forced = WinRmConfigBuilder::new("h")
            .credentials("CORP\\alice", "pw")
            .auth_method(AuthMethod::Basic)
            .build()
            .unwrap();
        assert_eq!(forced.auth_method, AuthMethod::Basic);
    }

    #[test]
    fn test_builder_custom_port_and_path() {
        let config = WinRmConfigBuilder::new("10.0.0.5")
            .credentials("admin", "pw")
            .port(15985)
            .path("custom")
            .workstation("BUILD01")
            .build()
            .unwrap();
        assert_eq!(config.endpoint_url(), "http://10.0.0.5:15985/custom");
        assert_eq!(config.workstation, "BUILD01");
    }

    #[test]
    fn test_builder_rejects_missing_fields() {
        assert!(matches!(
            WinRmConfigBuilder::new("").credentials("a", "b").build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            WinRmConfigBuilder::new("host").build(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = WinRmConfigBuilder::new("h")
            .credentials("admin", "hunter2")
            .build()
            .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_auth_method_from_str() {
        assert_eq!("NTLM".parse::<AuthMethod>().unwrap(), AuthMethod::Ntlm);
        assert_eq!("negotiate".parse::<AuthMethod>().unwrap(), AuthMethod::Ntlm);
        assert_eq!("basic".parse::<AuthMethod>().unwrap(), AuthMethod::Basic);
        assert!("kerberos".parse::<AuthMethod>().is_err());
    }
}
