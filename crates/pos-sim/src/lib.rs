//! Payment Terminal Simulation Library
//!
//! This crate provides a simulated payment terminal for exercising the
//! transaction coordinator without hardware. It includes:
//!
//! - **VirtualTerminal**: synchronous terminal model with scenarios and a
//!   virtual card catalogue
//! - **run_terminal_task**: async task that drives a terminal from command
//!   envelopes and operator controls
//! - **bridge_wire**: serves a terminal over any byte stream using the line
//!   protocol
//!
//! # Example
//!
//! ```rust
//! use pos_protocol::{SimulatorCommand, TerminalCommand, TransactionRequest};
//! use pos_sim::{OperatorAction, Scenario, VirtualTerminal};
//!
//! let mut terminal = VirtualTerminal::new("counter-1");
//! terminal.set_scenario(Scenario::Insufficient);
//!
//! let sale = TerminalCommand::Transaction(TransactionRequest::sale(2500).unwrap());
//! terminal.receive_command(SimulatorCommand::from_command(&sale));
//! terminal.respond(OperatorAction::Approve);
//!
//! let response = terminal.take_output().unwrap();
//! assert_eq!(response.error.as_deref(), Some("INSUFFICIENT_FUNDS"));
//! ```

pub mod error;
pub mod scenario;
pub mod task;
pub mod terminal;
pub mod wire;

pub use error::SimError;
pub use scenario::{CardBrand, CardType, OperatorAction, Scenario, VirtualCard};
pub use task::{
    run_terminal_task, spawn_virtual_terminal, TerminalControl, TerminalHandle, TerminalLink,
    TerminalStateEvent,
};
pub use terminal::{
    generate_auth_code, generate_transaction_id, AutoRespond, CommandDisposition, TerminalConfig,
    VirtualTerminal,
};
pub use wire::{bridge_wire, serve_wire};
