//! # winrm-shell - A WS-Management Remote Shell Client
//!
//! winrm-shell runs commands on Windows hosts over WinRM: it opens a remote
//! `cmd` shell through SOAP envelopes posted to the `/wsman` listener,
//! executes command lines or PowerShell scripts in it, collects their output
//! and deletes the shell again.
//!
//! ## Core Concepts
//!
//! - **Shell**: a server-side `cmd` process created per session and
//!   identified by a shell id
//! - **Command**: one command line running inside a shell, identified by a
//!   command id
//! - **Streams**: base64 `stdout`/`stderr` fragments returned by receive calls
//! - **Prompt rules**: patterns or detectors that answer interactive prompts
//!   by writing to the command's stdin
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │       runner / session (one-shot commands, REPL sessions)     │
//! └───────────────────────────────────────────────────────────────┘
//!                │                                  │
//!                ▼                                  ▼
//! ┌─────────────────────────────┐   ┌─────────────────────────────┐
//! │  shell (WinRmClient,        │◄──│  interactive (poll, detect  │
//! │  shell/command handles)     │   │  prompts, answer, back off) │
//! └─────────────────────────────┘   └─────────────────────────────┘
//!                │
//!                ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  soap (envelope builders, response parsing and extraction)    │
//! └───────────────────────────────────────────────────────────────┘
//!                │
//!                ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  connection (transport: Basic or NTLMv2 handshake over HTTP)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use winrm_shell::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = WinRmConfigBuilder::new("win01.corp.local")
//!         .credentials("CORP\\deploy", "secret")
//!         .build()?;
//!     let client = WinRmClient::new(config)?;
//!
//!     let output = run_powershell(&client, "Get-Service WinRM").await?;
//!     println!("{}", output);
//!
//!     let rules = vec![PromptRule::regex(r"(?i)continue\?", "y")?];
//!     let output = run_interactive_command(
//!         &client,
//!         "installer.exe",
//!         &rules,
//!         &InteractiveOptions::default(),
//!     )
//!     .await?;
//!     println!("{}", output);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The library emits `tracing` events and installs no subscriber. Enable
//! them per module, e.g. `RUST_LOG=winrm_shell::interactive=debug`.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types.
    //!
    //! ```rust,ignore
    //! use winrm_shell::prelude::*;
    //! ```

    // Connection
    pub use crate::connection::{AuthMethod, WinRmConfig, WinRmConfigBuilder};

    // Error handling
    pub use crate::error::{Error, Result};

    // Shell lifecycle
    pub use crate::shell::{CommandHandle, ReceiveOutput, ShellHandle, WinRmClient};

    // Interactive execution
    pub use crate::interactive::{run_interactive, CommandStream, InteractiveOptions, PromptRule};

    // Runners and sessions
    pub use crate::runner::{
        run_command, run_interactive_command, run_interactive_powershell, run_powershell,
    };
    pub use crate::session::{ReplCommandResult, ReplSession};
}

/// Error types for WinRM operations
pub mod error;

/// Connection parameters, credentials and the HTTP transport
///
/// Supports Basic authentication for local accounts and NTLMv2 for domain
/// accounts.
pub mod connection;

/// SOAP envelope construction and response parsing
pub mod soap;

/// Remote shell and command lifecycle
pub mod shell;

/// Interactive execution with prompt detection
pub mod interactive;

/// One-shot command runners
pub mod runner;

/// Long-lived REPL sessions
pub mod session;

/// Application configuration
pub mod config;

pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
