//! Error types for the simulated terminal

use thiserror::Error;

/// Errors raised by the simulated terminal and its controls
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("unknown card: {0}")]
    UnknownCard(String),

    #[error("unknown operator action: {0}")]
    UnknownAction(String),

    /// The terminal task has already stopped
    #[error("virtual terminal closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
