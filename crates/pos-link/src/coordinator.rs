//! Transaction Coordinator Actor
//!
//! This module provides the async actor that owns every piece of mutable
//! protocol state: the active channel (through the [`DispatchRouter`]), the
//! single transaction slot and the health-check slot. Nothing else touches
//! them, so no locking is needed and request handling never interleaves.
//!
//! # Architecture
//!
//! The actor receives [`CoordinatorCommand`]s from two sources:
//! - callers, through [`PosService`](crate::PosService), each carrying a
//!   oneshot sender for the reply
//! - transport tasks, reporting received lines and closed channels
//!
//! Timeouts are not separate timer tasks. The actor's select loop sleeps
//! until the earliest deadline held by a slot; settling a slot removes its
//! deadline, so there is nothing left to fire against a later request.
//!
//! # Example
//!
//! ```rust,ignore
//! use pos_link::coordinator::run_coordinator;
//! use pos_link::CoordinatorConfig;
//! use tokio::sync::{broadcast, mpsc};
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (event_tx, _) = broadcast::channel(256);
//! tokio::spawn(run_coordinator(cmd_rx, cmd_tx.downgrade(), event_tx, CoordinatorConfig::default()));
//! ```

use std::time::SystemTime;

use pos_protocol::{ResponseFrame, TerminalCommand, TransactionRequest};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelMeta, SimulatedLink};
use crate::config::CoordinatorConfig;
use crate::connection::LineStream;
use crate::error::LinkError;
use crate::events::TerminalEvent;
use crate::outcome::{HealthOutcome, TransactionOutcome};
use crate::router::{DispatchRouter, Route};
use crate::slot::{HealthSlot, TransactionSlot};
use crate::state::{ChannelId, CoordinatorStatus, TransactionPhase};

/// Commands sent to the coordinator actor
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Open a serial port, replacing any active channel
    Connect {
        port: String,
        /// Falls back to the configured baud rate
        baud_rate: Option<u32>,
        response: oneshot::Sender<Result<ChannelMeta, LinkError>>,
    },

    /// Attach a terminal reachable over an arbitrary byte stream
    AttachStream {
        name: String,
        stream: LineStream,
        response: oneshot::Sender<Result<ChannelMeta, LinkError>>,
    },

    /// Close the active channel, whatever its kind
    Disconnect { response: oneshot::Sender<bool> },

    /// Attach a simulated terminal, replacing any active channel
    OpenSimulator {
        link: SimulatedLink,
        response: oneshot::Sender<Result<ChannelMeta, LinkError>>,
    },

    /// Close the active channel if it is the simulator
    CloseSimulator { response: oneshot::Sender<bool> },

    /// Submit a payment
    Submit {
        request: TransactionRequest,
        response: oneshot::Sender<TransactionOutcome>,
    },

    /// Probe the terminal
    HealthCheck {
        response: oneshot::Sender<HealthOutcome>,
    },

    /// Abandon the pending transaction
    Cancel { response: oneshot::Sender<bool> },

    /// A line arrived on a channel (from a transport task)
    LineReceived { channel: ChannelId, line: Vec<u8> },

    /// A channel's transport ended on its own (from a transport task)
    ChannelClosed { channel: ChannelId, reason: String },

    /// Snapshot the coordinator state
    QueryStatus {
        response: oneshot::Sender<CoordinatorStatus>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Transaction waiting for a pending health check to settle
struct QueuedTransaction {
    request: TransactionRequest,
    route: Route,
    reply: oneshot::Sender<TransactionOutcome>,
}

/// Internal state for the coordinator actor
struct CoordinatorState {
    config: CoordinatorConfig,
    router: DispatchRouter,
    transaction: TransactionSlot,
    health: HealthSlot,
    /// A transaction submitted while a health check held the line
    queued: Option<QueuedTransaction>,
    phase: TransactionPhase,
    /// Handed to transport tasks; weak so callers dropping their handles
    /// can still stop an idle actor
    self_tx: mpsc::WeakSender<CoordinatorCommand>,
    event_tx: broadcast::Sender<TerminalEvent>,
}

impl CoordinatorState {
    fn new(
        config: CoordinatorConfig,
        self_tx: mpsc::WeakSender<CoordinatorCommand>,
        event_tx: broadcast::Sender<TerminalEvent>,
    ) -> Self {
        Self {
            config,
            router: DispatchRouter::new(),
            transaction: TransactionSlot::new(),
            health: HealthSlot::new(),
            queued: None,
            phase: TransactionPhase::Idle,
            self_tx,
            event_tx,
        }
    }

    fn emit(&self, event: TerminalEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn set_phase(&mut self, to: TransactionPhase) {
        if self.phase != to {
            debug!("Transaction phase {:?} -> {:?}", self.phase, to);
            self.emit(TerminalEvent::PhaseChanged {
                from: self.phase,
                to,
            });
            self.phase = to;
        }
    }

    /// Earliest deadline held by either slot
    fn next_deadline(&self) -> Option<Instant> {
        match (self.transaction.deadline(), self.health.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Connect {
                port,
                baud_rate,
                response,
            } => {
                let baud_rate = baud_rate.unwrap_or(self.config.baud_rate);
                // Serial ports are opened exclusively
                let reopening = self
                    .router
                    .active()
                    .is_some_and(|c| !c.is_simulated() && c.meta().port_name == port);
                if reopening {
                    self.close_active("reopening serial port");
                }
                let result = self.open_channel("replaced by serial connection", |id, tx| {
                    Channel::open_serial(id, &port, baud_rate, tx)
                });
                if let Err(ref e) = result {
                    warn!("Failed to connect to {}: {}", port, e);
                    self.emit(TerminalEvent::Error {
                        source: "Serial".to_string(),
                        message: e.to_string(),
                    });
                }
                let _ = response.send(result);
            }

            CoordinatorCommand::AttachStream {
                name,
                stream,
                response,
            } => {
                let result = self.open_channel("replaced by stream connection", |id, tx| {
                    Ok(Channel::from_stream(id, name, stream, tx))
                });
                let _ = response.send(result);
            }

            CoordinatorCommand::Disconnect { response } => {
                let closed = self.close_active("disconnected");
                let _ = response.send(closed);
            }

            CoordinatorCommand::OpenSimulator { link, response } => {
                let result = self.open_channel("replaced by simulator", |id, tx| {
                    Ok(Channel::simulated(id, link, tx))
                });
                let _ = response.send(result);
            }

            CoordinatorCommand::CloseSimulator { response } => {
                let closed = self.router.simulator_running() && self.close_active("simulator closed");
                let _ = response.send(closed);
            }

            CoordinatorCommand::Submit { request, response } => {
                self.submit(request, response).await;
            }

            CoordinatorCommand::HealthCheck { response } => {
                self.health_check(response).await;
            }

            CoordinatorCommand::Cancel { response } => {
                let err = LinkError::Cancelled("cancelled by caller".to_string());
                let cancelled = self.finish_transaction(TransactionOutcome::failed(&err))
                    || self.fail_queued(&err);
                if cancelled {
                    info!("Pending transaction cancelled by caller");
                }
                let _ = response.send(cancelled);
            }

            CoordinatorCommand::LineReceived { channel, line } => {
                self.on_line(channel, line);
            }

            CoordinatorCommand::ChannelClosed { channel, reason } => {
                if self.router.is_active(channel) {
                    warn!("Channel {} closed: {}", channel.0, reason);
                    self.close_active(&reason);
                } else {
                    debug!("Ignoring close of inactive channel {}", channel.0);
                }
            }

            CoordinatorCommand::QueryStatus { response } => {
                let _ = response.send(CoordinatorStatus {
                    phase: self.phase,
                    channel: self.router.active().map(|c| c.meta().clone()),
                    health_check_pending: self.health.is_occupied(),
                    simulator: self.router.simulator_status(),
                });
            }

            // Handled by the run loop
            CoordinatorCommand::Shutdown => {}
        }
    }

    /// Make a new channel the active one
    ///
    /// The new transport is opened before the previous channel is touched,
    /// so a failed open leaves the working channel in place. On success the
    /// previous channel is closed, failing anything pending on it.
    fn open_channel<F>(&mut self, reason: &str, open: F) -> Result<ChannelMeta, LinkError>
    where
        F: FnOnce(ChannelId, mpsc::Sender<CoordinatorCommand>) -> Result<Channel, LinkError>,
    {
        let coord_tx = self.self_tx.upgrade().ok_or(LinkError::NotConnected)?;
        let id = self.router.next_channel_id();
        let channel = open(id, coord_tx)?;
        let meta = channel.meta().clone();

        self.close_active(reason);
        self.router.install(channel);

        info!(
            "Channel {} open on {} ({:?})",
            meta.id.0, meta.port_name, meta.kind
        );
        self.emit(TerminalEvent::ChannelOpened { meta: meta.clone() });
        Ok(meta)
    }

    /// Close the active channel, failing pending requests first
    ///
    /// Returns false if nothing was open.
    fn close_active(&mut self, reason: &str) -> bool {
        let Some(channel) = self.router.take_active() else {
            return false;
        };
        let id = channel.id();

        let err = LinkError::Cancelled(reason.to_string());
        self.finish_transaction(TransactionOutcome::failed(&err));
        self.fail_queued(&err);
        self.finish_health(HealthOutcome::failed(&err));

        channel.close();
        self.emit(TerminalEvent::ChannelClosed {
            channel: id,
            reason: reason.to_string(),
        });
        true
    }

    /// Write one command on the active channel, bounded by the write timeout
    async fn send_command(&self, command: &TerminalCommand) -> Result<(), LinkError> {
        let channel = self.router.active().ok_or(LinkError::NotConnected)?;
        let id = channel.id();
        let data = match timeout(self.config.write_timeout(), channel.send(command)).await {
            Ok(result) => result?,
            Err(_) => return Err(LinkError::WriteFailure("write timed out".to_string())),
        };
        self.emit(TerminalEvent::CommandSent {
            channel: id,
            data,
            timestamp: SystemTime::now(),
        });
        Ok(())
    }

    async fn submit(
        &mut self,
        request: TransactionRequest,
        reply: oneshot::Sender<TransactionOutcome>,
    ) {
        let route = match self.router.route() {
            Ok(route) => route,
            Err(e) => {
                debug!("Rejecting transaction: {}", e);
                let _ = reply.send(TransactionOutcome::failed(&e));
                return;
            }
        };

        if self.transaction.is_occupied() || self.queued.is_some() {
            debug!("Rejecting transaction: busy");
            let _ = reply.send(TransactionOutcome::failed(&LinkError::Busy));
            return;
        }

        // One listener at a time on the line: wait out the health check
        if self.health.is_occupied() {
            info!("Transaction queued behind pending health check");
            self.queued = Some(QueuedTransaction {
                request,
                route,
                reply,
            });
            self.set_phase(TransactionPhase::AwaitingSend);
            return;
        }

        let command = TerminalCommand::Transaction(request);
        self.set_phase(TransactionPhase::AwaitingSend);

        if let Err(e) = self.send_command(&command).await {
            warn!("Failed to send {}: {}", command, e);
            let outcome = TransactionOutcome::failed(&e);
            self.emit(TerminalEvent::TransactionSettled {
                route,
                outcome: outcome.clone(),
            });
            let _ = reply.send(outcome);
            self.set_phase(TransactionPhase::Idle);
            return;
        }

        let now = Instant::now();
        let window = self.config.transaction_timeout(route);
        let line = command.to_line();
        if let Ok(id) = self
            .transaction
            .install(command, route, reply, now, now + window)
        {
            info!(
                "Transaction {} sent via {:?} ({}), waiting up to {:?}",
                id.0, route, line, window
            );
            self.set_phase(TransactionPhase::AwaitingResponse);
        }
    }

    async fn health_check(&mut self, reply: oneshot::Sender<HealthOutcome>) {
        let route = match self.router.route() {
            Ok(route) => route,
            Err(e) => {
                let _ = reply.send(HealthOutcome::failed(&e));
                return;
            }
        };

        if self.transaction.is_occupied() || self.queued.is_some() || self.health.is_occupied() {
            let _ = reply.send(HealthOutcome::failed(&LinkError::Busy));
            return;
        }

        if let Err(e) = self.send_command(&TerminalCommand::HealthCheck).await {
            warn!("Failed to send health check: {}", e);
            let _ = reply.send(HealthOutcome::failed(&e));
            return;
        }

        let now = Instant::now();
        let deadline = now + self.config.health_timeout();
        if self
            .health
            .install(TerminalCommand::HealthCheck, route, reply, now, deadline)
            .is_ok()
        {
            debug!("Health check sent via {:?}", route);
        }
    }

    /// Route an inbound line to whichever request is waiting for it
    fn on_line(&mut self, channel: ChannelId, line: Vec<u8>) {
        if !self.router.is_active(channel) {
            debug!("Discarding line from inactive channel {}", channel.0);
            self.emit(TerminalEvent::LineDiscarded {
                channel,
                data: line,
                reason: "channel not active".to_string(),
            });
            return;
        }

        self.emit(TerminalEvent::LineReceived {
            channel,
            data: line.clone(),
            timestamp: SystemTime::now(),
        });

        // Any line at all answers a health check
        if self.health.is_occupied() {
            self.finish_health(HealthOutcome::alive());
            return;
        }

        if !self.transaction.is_occupied() {
            info!(
                "Discarding line with no pending transaction: {:?}",
                String::from_utf8_lossy(&line)
            );
            self.emit(TerminalEvent::LineDiscarded {
                channel,
                data: line,
                reason: "no pending transaction".to_string(),
            });
            return;
        }

        let outcome = match ResponseFrame::decode(&line) {
            Ok(frame) => TransactionOutcome::from_frame(&frame),
            Err(e) => {
                warn!(
                    "Unreadable response {:?}: {}",
                    String::from_utf8_lossy(&line),
                    e
                );
                TransactionOutcome::failed(&LinkError::ParseFailure(e.to_string()))
            }
        };
        self.finish_transaction(outcome);
    }

    /// Settle the transaction slot; false if it was already empty
    fn finish_transaction(&mut self, outcome: TransactionOutcome) -> bool {
        let Some(settled) = self.transaction.settle(outcome.clone()) else {
            return false;
        };
        info!(
            "Transaction {} settled after {:?}: success={} error={:?}",
            settled.id.0, settled.elapsed, outcome.success, outcome.error
        );
        self.emit(TerminalEvent::TransactionSettled {
            route: settled.route,
            outcome,
        });
        self.set_phase(TransactionPhase::Idle);
        true
    }

    /// Fail a queued transaction before it reaches the line
    fn fail_queued(&mut self, err: &LinkError) -> bool {
        let Some(queued) = self.queued.take() else {
            return false;
        };
        let outcome = TransactionOutcome::failed(err);
        info!("Queued transaction dropped: {}", err);
        self.emit(TerminalEvent::TransactionSettled {
            route: queued.route,
            outcome: outcome.clone(),
        });
        let _ = queued.reply.send(outcome);
        self.set_phase(TransactionPhase::Idle);
        true
    }

    /// Send the queued transaction once the health check is done with the line
    async fn release_queued(&mut self) {
        if self.health.is_occupied() {
            return;
        }
        if let Some(queued) = self.queued.take() {
            debug!("Health check settled, sending queued transaction");
            self.submit(queued.request, queued.reply).await;
        }
    }

    fn finish_health(&mut self, outcome: HealthOutcome) -> bool {
        let Some(settled) = self.health.settle(outcome.clone()) else {
            return false;
        };
        debug!(
            "Health check settled after {:?}: {}",
            settled.elapsed, outcome.message
        );
        self.emit(TerminalEvent::HealthChecked { outcome });
        true
    }

    /// Fail whichever slots have run past their deadline
    fn expire(&mut self, now: Instant) {
        if self.transaction.is_expired(now) {
            warn!("Transaction timed out waiting for the terminal");
            self.finish_transaction(TransactionOutcome::failed(&LinkError::Timeout));
        }
        if self.health.is_expired(now) {
            warn!("Health check timed out");
            self.finish_health(HealthOutcome::failed(&LinkError::Timeout));
        }
    }
}

/// Sleep until `deadline`, or forever if there is none
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run the coordinator actor
///
/// Processes commands until [`CoordinatorCommand::Shutdown`] arrives or
/// every sender is gone, then closes the active channel.
pub async fn run_coordinator(
    mut cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    self_tx: mpsc::WeakSender<CoordinatorCommand>,
    event_tx: broadcast::Sender<TerminalEvent>,
    config: CoordinatorConfig,
) {
    let mut state = CoordinatorState::new(config, self_tx, event_tx);
    info!("Transaction coordinator started");

    loop {
        let deadline = state.next_deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                if matches!(cmd, CoordinatorCommand::Shutdown) {
                    info!("Shutdown requested for transaction coordinator");
                    break;
                }
                state.handle(cmd).await;
            }

            _ = wait_for(deadline) => {
                state.expire(Instant::now());
            }
        }
        state.release_queued().await;
    }

    state.close_active("coordinator stopped");
    info!("Transaction coordinator stopped");
}
