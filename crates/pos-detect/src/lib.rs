//! POS Serial Port Detection
//!
//! This crate lists the serial ports a payment terminal could be attached
//! to, along with a human-readable label for each.
//!
//! # Example
//!
//! ```rust,no_run
//! use pos_detect::PortScanner;
//!
//! for transport in PortScanner::new().list_transports() {
//!     println!("{} ({})", transport.identifier, transport.label);
//! }
//! ```

pub mod error;
pub mod scanner;

pub use error::DetectError;
pub use scanner::{PortScanner, TransportInfo, UNKNOWN_LABEL};
