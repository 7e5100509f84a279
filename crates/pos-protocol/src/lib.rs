//! POS Terminal Line Protocol
//!
//! This crate provides parsing and encoding for the pipe-delimited, CRLF
//! terminated line protocol spoken by serial payment terminals:
//!
//! - **Commands** (host → terminal): `SALE|5000|1`, `REFUND|5000|3`, `TEST`
//! - **Responses** (terminal → host):
//!   `STATUS|MESSAGE|TRANSACTION_ID|AUTH_CODE|CARD_NUMBER|ERROR`
//!
//! It also defines the envelope objects used when the terminal is simulated
//! in-process instead of attached over a serial line.
//!
//! Decoding is pure: nothing here touches transaction state.
//!
//! # Example
//!
//! ```rust
//! use pos_protocol::{EncodeCommand, LineCodec, ResponseFrame, TerminalCommand, TransactionRequest};
//!
//! let request = TransactionRequest::sale(5000).unwrap();
//! assert_eq!(TerminalCommand::Transaction(request).encode(), b"SALE|5000|1\r\n");
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"SUCCESS|Approved|TXN123|AUTH99\r\n");
//! let line = codec.next_line().unwrap();
//! let frame = ResponseFrame::decode(&line).unwrap();
//! assert!(frame.status.is_positive());
//! assert_eq!(frame.transaction_id, "TXN123");
//! ```

pub mod codec;
pub mod command;
pub mod envelope;
pub mod error;
pub mod request;
pub mod response;

pub use codec::LineCodec;
pub use command::{TerminalCommand, HEALTH_CHECK_TOKEN};
pub use envelope::{CommandName, SimulatorCommand, SimulatorResponse};
pub use error::{ParseError, ValidationError};
pub use request::{
    TransactionInput, TransactionKind, TransactionRequest, MAX_AMOUNT, MAX_INSTALLMENTS,
};
pub use response::{ResponseFrame, ResponseStatus, RESPONSE_FIELDS};

/// Separator between positional fields
pub const FIELD_SEPARATOR: char = '|';

/// Terminator appended to every encoded line
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Longest line accepted from a terminal, in bytes
pub const MAX_LINE_LEN: usize = 1024;

/// Trait for frames that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this frame to its wire format, terminator included
    fn encode(&self) -> Vec<u8>;
}
