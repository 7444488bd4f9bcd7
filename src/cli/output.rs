//! Output formatting module for winrm-shell
//!
//! Provides colored human output and JSON lines for scripting.

use colored::Colorize;
use serde_json::json;
use std::time::Duration;

use winrm_shell::session::{ReplCommandResult, SessionInfo};

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
        }
    }

    /// Print the output of a finished command
    pub fn command_output(&self, host: &str, output: &str, elapsed: Duration) {
        if self.json_mode {
            let result = json!({
                "host": host,
                "output": output,
                "elapsed_ms": elapsed.as_millis() as u64,
            });
            println!("{}", result);
            return;
        }

        print!("{}", output);
        if !output.is_empty() && !output.ends_with('\n') {
            println!();
        }
        self.debug(&format!("Completed in {:.2}s", elapsed.as_secs_f64()));
    }

    /// Print one REPL result
    pub fn repl_result(&self, result: &ReplCommandResult) {
        if self.json_mode {
            println!("{}", json!(result));
            return;
        }

        match &result.error {
            None => {
                print!("{}", result.output);
                if !result.output.is_empty() && !result.output.ends_with('\n') {
                    println!();
                }
            }
            Some(err) => self.error(err),
        }
        self.debug(&format!(
            "Completed in {:.2}s",
            result.execution_time.as_secs_f64()
        ));
    }

    /// Print session details
    pub fn session_info(&self, info: &SessionInfo) {
        if self.json_mode {
            println!("{}", json!(info));
            return;
        }

        let rows = [
            ("shell", info.shell_id.clone()),
            ("host", format!("{}:{}", info.host, info.port)),
            ("active", info.is_active.to_string()),
            ("started", info.started_at.to_rfc3339()),
            ("last activity", info.last_activity.to_rfc3339()),
        ];
        for (key, value) in rows {
            if self.use_color {
                println!("  {:<14} {}", key.cyan(), value);
            } else {
                println!("  {:<14} {}", key, value);
            }
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            eprintln!("{}", json!({ "type": "error", "message": message }));
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            eprintln!("{}", json!({ "type": "warning", "message": message }));
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.json_mode {
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "INFO:".blue(), message);
        } else {
            eprintln!("INFO: {}", message);
        }
    }

    /// Print a debug message (requires higher verbosity)
    pub fn debug(&self, message: &str) {
        if self.verbosity < 2 || self.json_mode {
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "DEBUG:".magenta(), message);
        } else {
            eprintln!("DEBUG: {}", message);
        }
    }

    /// Print the REPL banner
    pub fn banner(&self, host: &str, shell_id: &str) {
        if self.json_mode {
            return;
        }

        let title = format!("Connected to {} (shell {})", host, shell_id);
        if self.use_color {
            eprintln!("{}", title.bright_blue().bold());
            eprintln!("{}", "Type :help for commands, :exit to quit".bright_black());
        } else {
            eprintln!("{}", title);
            eprintln!("Type :help for commands, :exit to quit");
        }
    }
}
