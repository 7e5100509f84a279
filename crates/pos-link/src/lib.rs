//! Payment Terminal Link
//!
//! This crate drives a single payment terminal, either a hardware unit on a
//! serial line or an in-process simulated terminal, and guarantees that at
//! most one transaction is ever in flight.
//!
//! # Architecture
//!
//! - A [`Channel`] is the one open path to a terminal. Serial channels run a
//!   [`LineConnection`] task; simulated channels forward envelope objects.
//! - The [`DispatchRouter`] owns the active channel and picks a [`Route`]
//!   for each new request.
//! - The coordinator actor ([`run_coordinator`]) owns the transaction and
//!   health-check slots, enforces response windows and turns response lines
//!   into [`TransactionOutcome`]s.
//! - [`PosService`] is the caller-facing handle, with per-channel rate
//!   limiting in front of the actor.
//! - Everything observable is published as a [`TerminalEvent`].
//!
//! # Example
//!
//! ```rust,no_run
//! use pos_link::{spawn_coordinator, CoordinatorConfig};
//! use pos_protocol::TransactionRequest;
//!
//! # async fn demo() -> Result<(), pos_link::LinkError> {
//! let (service, _task) = spawn_coordinator(CoordinatorConfig::default());
//! service.connect("/dev/ttyUSB0", None).await?;
//!
//! let outcome = service
//!     .submit_transaction(TransactionRequest::sale(5000)?)
//!     .await;
//! println!("{}: {}", outcome.success, outcome.message);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod outcome;
pub mod rate_limit;
pub mod router;
pub mod service;
pub mod slot;
pub mod state;

// Re-export channel types
pub use channel::{Channel, ChannelKind, ChannelMeta, SimulatedLink, VIRTUAL_PORT};
pub use connection::{LineConnection, LineIo, LineStream};

// Re-export coordinator types
pub use config::{CoordinatorConfig, RateLimitConfig, DEFAULT_BAUD_RATE};
pub use coordinator::{run_coordinator, CoordinatorCommand};
pub use router::{DispatchRouter, Route};
pub use service::{spawn_coordinator, PosService};
pub use slot::{HealthSlot, SlotId, TransactionSlot};
pub use state::{ChannelId, CoordinatorStatus, SimulatorStatus, TransactionPhase};

// Re-export result and event types
pub use error::LinkError;
pub use events::TerminalEvent;
pub use outcome::{HealthOutcome, TransactionOutcome};
pub use rate_limit::RateLimiter;
