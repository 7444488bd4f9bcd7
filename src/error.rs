//! Error types for winrm-shell.
//!
//! Every layer of the client (envelope codec, transport, shell lifecycle,
//! interactive engine) reports failures through the single [`Error`] enum so
//! callers can match on the failure class without inspecting wire traffic.

use thiserror::Error;

/// Result type alias for winrm-shell operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for winrm-shell.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Non-2xx HTTP status or a failed connection.
    #[error("Transport error: {message}")]
    Transport {
        /// HTTP status code, absent when the connection itself failed
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// An HTTP request, a poll loop or an interactive execution ran out of time.
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        /// What timed out
        operation: String,
        /// The configured limit in milliseconds
        duration_ms: u64,
    },

    /// NTLM challenge missing or the authenticate step was rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A feature the server asked for that this client does not implement.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The server answered with a SOAP fault.
    #[error("SOAP fault: {subcode}{}", fault_reason(.reason))]
    ProtocolFault {
        /// Value of the fault's `Code/Subcode/Value` node
        subcode: String,
        /// Human readable `Reason/Text`, when present
        reason: Option<String>,
    },

    /// An expected field is missing from an otherwise well-formed response.
    #[error("Unable to extract {0} from response")]
    Extraction(&'static str),

    /// The response body could not be parsed.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Configuration is invalid or incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A shell or command handle was used outside its lifetime.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a transport error for an unexpected HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a transport error for a failure below HTTP.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a timeout error for `operation` after `duration_ms`.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the server returned a SOAP fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Error::ProtocolFault { .. })
    }

    /// Returns the fault subcode when this is a SOAP fault.
    pub fn fault_subcode(&self) -> Option<&str> {
        match self {
            Error::ProtocolFault { subcode, .. } => Some(subcode),
            _ => None,
        }
    }

    /// Returns the HTTP status carried by a transport error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Transport { .. } => 2,
            Error::Authentication(_) | Error::Unsupported(_) => 3,
            Error::Timeout { .. } => 4,
            Error::ProtocolFault { .. } | Error::Extraction(_) | Error::MalformedResponse(_) => 5,
            _ => 1,
        }
    }
}

fn fault_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::status(status.as_u16(), err.to_string()),
            None => Error::transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_contains_duration() {
        let err = Error::timeout("Interactive command", 1000);
        assert_eq!(err.to_string(), "Interactive command timed out after 1000ms");
        assert!(err.is_timeout());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_fault_display() {
        let err = Error::ProtocolFault {
            subcode: "w:InvalidSelectors".to_string(),
            reason: Some("The shell was not found".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "SOAP fault: w:InvalidSelectors (The shell was not found)"
        );
        assert_eq!(err.fault_subcode(), Some("w:InvalidSelectors"));

        let bare = Error::ProtocolFault {
            subcode: "Sender".to_string(),
            reason: None,
        };
        assert_eq!(bare.to_string(), "SOAP fault: Sender");
    }

    #[test]
    fn test_status_code() {
        assert_eq!(Error::status(401, "denied").status_code(), Some(401));
        assert_eq!(Error::transport("refused").status_code(), None);
        assert_eq!(Error::Extraction("shell ID").status_code(), None);
    }
}
