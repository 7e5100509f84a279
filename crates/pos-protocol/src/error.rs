//! Error types for terminal line parsing and request validation

use thiserror::Error;

/// Errors that can occur while decoding a line from the terminal
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line contained bytes that are not valid UTF-8
    #[error("line is not valid UTF-8")]
    InvalidEncoding,

    /// Line was empty after stripping the terminator
    #[error("empty line")]
    Empty,

    /// Status token is missing or contains characters outside `[A-Za-z0-9_-]`
    #[error("invalid status token: {0:?}")]
    InvalidStatus(String),

    /// Line exceeds the maximum accepted length
    #[error("line too long: {len} bytes (max {max})")]
    LineTooLong { len: usize, max: usize },

    /// Command line could not be recognised (peer-side parsing)
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Numeric field could not be parsed
    #[error("invalid number in field {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Errors raised when building a request from untrusted input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Amount is zero, negative, or above the accepted ceiling
    #[error("amount must be between 1 and {max}, got {got}")]
    AmountOutOfRange { got: i64, max: u64 },

    /// Transaction kind is not `sale` or `refund`
    #[error("unknown transaction kind: {0:?}")]
    UnknownKind(String),

    /// Installment count outside `1..=12`
    #[error("installments must be between 1 and {max}, got {got}")]
    InstallmentsOutOfRange { got: i64, max: u8 },
}
