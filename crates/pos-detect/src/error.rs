//! Error types for port detection

use thiserror::Error;

/// Errors that can occur while looking for terminals
#[derive(Debug, Error)]
pub enum DetectError {
    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
