//! Error types for terminal links

use pos_protocol::ValidationError;
use thiserror::Error;

/// Errors that can occur while talking to a terminal
///
/// Every variant maps to a stable code via [`LinkError::error_code`], which
/// is what callers see in the `error` field of an outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No transport is open
    #[error("terminal not connected")]
    NotConnected,

    /// Another request is already outstanding
    #[error("terminal is busy with another request")]
    Busy,

    /// Transport rejected the write
    #[error("write failed: {0}")]
    WriteFailure(String),

    /// No response within the window
    #[error("no response from terminal")]
    Timeout,

    /// Response line could not be decoded
    #[error("unreadable response: {0}")]
    ParseFailure(String),

    /// Terminal reported a negative outcome
    #[error("{message} ({code})")]
    Declined { code: String, message: String },

    /// Request abandoned before the terminal answered
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Transport could not be opened
    #[error("failed to open {port}: {reason}")]
    ConnectionFailed { port: String, reason: String },

    /// Too many requests on one channel within the window
    #[error("too many requests on {channel}")]
    RateLimited { channel: String },

    /// Request failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LinkError {
    /// Stable code reported to callers
    pub fn error_code(&self) -> &str {
        match self {
            LinkError::NotConnected => "NOT_CONNECTED",
            LinkError::Busy => "BUSY",
            LinkError::WriteFailure(_) => "WRITE_FAILED",
            LinkError::Timeout => "TIMEOUT",
            LinkError::ParseFailure(_) => "PARSE_ERROR",
            LinkError::Declined { code, .. } => code,
            LinkError::Cancelled(_) => "CANCELLED",
            LinkError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            LinkError::RateLimited { .. } => "RATE_LIMITED",
            LinkError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

impl From<ValidationError> for LinkError {
    fn from(e: ValidationError) -> Self {
        LinkError::InvalidRequest(e.to_string())
    }
}
