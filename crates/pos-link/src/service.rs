//! Caller-facing handle to the coordinator
//!
//! [`PosService`] is cheap to clone. Each method sends one command to the
//! actor and awaits its reply, after passing the request through the
//! shared rate limiter.

use std::sync::Arc;

use pos_detect::{PortScanner, TransportInfo};
use pos_protocol::{TransactionInput, TransactionRequest};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::{ChannelMeta, SimulatedLink};
use crate::config::CoordinatorConfig;
use crate::connection::{LineIo, LineStream};
use crate::coordinator::{run_coordinator, CoordinatorCommand};
use crate::error::LinkError;
use crate::events::TerminalEvent;
use crate::outcome::{HealthOutcome, TransactionOutcome};
use crate::rate_limit::{RateLimiter, HEALTH_CHANNEL, PORTS_CHANNEL, TRANSACTION_CHANNEL};
use crate::state::{CoordinatorStatus, SimulatorStatus};

/// Spawn a coordinator and return a handle to it
///
/// Must be called from within a tokio runtime.
pub fn spawn_coordinator(config: CoordinatorConfig) -> (PosService, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.queue_size.max(1));
    let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    let handle = tokio::spawn(run_coordinator(
        cmd_rx,
        cmd_tx.downgrade(),
        event_tx.clone(),
        config,
    ));

    let service = PosService {
        cmd_tx,
        event_tx,
        limiter,
    };
    (service, handle)
}

/// Handle for submitting requests to a running coordinator
#[derive(Debug, Clone)]
pub struct PosService {
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
    event_tx: broadcast::Sender<TerminalEvent>,
    limiter: Arc<RateLimiter>,
}

impl PosService {
    /// Send a command and wait for its reply
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> CoordinatorCommand,
    ) -> Result<R, LinkError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| LinkError::NotConnected)?;
        rx.await.map_err(|_| LinkError::NotConnected)
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.event_tx.subscribe()
    }

    /// List serial ports a terminal could be attached to
    pub fn list_transports(&self) -> Result<Vec<TransportInfo>, LinkError> {
        self.limiter.check(PORTS_CHANNEL)?;
        Ok(PortScanner::new().list_transports())
    }

    /// Open a serial terminal, replacing any active channel
    pub async fn connect(
        &self,
        port: impl Into<String>,
        baud_rate: Option<u32>,
    ) -> Result<ChannelMeta, LinkError> {
        let port = port.into();
        self.request(|response| CoordinatorCommand::Connect {
            port,
            baud_rate,
            response,
        })
        .await?
    }

    /// Attach a terminal reachable through any byte stream
    pub async fn attach_stream(
        &self,
        name: impl Into<String>,
        io: impl LineIo + 'static,
    ) -> Result<ChannelMeta, LinkError> {
        let name = name.into();
        let stream = LineStream::new(io);
        self.request(|response| CoordinatorCommand::AttachStream {
            name,
            stream,
            response,
        })
        .await?
    }

    /// Close the active channel; `Ok(false)` if none was open
    pub async fn disconnect(&self) -> Result<bool, LinkError> {
        self.request(|response| CoordinatorCommand::Disconnect { response })
            .await
    }

    /// Submit a validated payment
    pub async fn submit_transaction(&self, request: TransactionRequest) -> TransactionOutcome {
        if let Err(e) = self.limiter.check(TRANSACTION_CHANNEL) {
            return TransactionOutcome::failed(&e);
        }
        self.submit(request).await
    }

    /// Validate raw caller input, then submit it
    pub async fn submit_input(&self, input: TransactionInput) -> TransactionOutcome {
        if let Err(e) = self.limiter.check(TRANSACTION_CHANNEL) {
            return TransactionOutcome::failed(&e);
        }
        match TransactionRequest::try_from(input) {
            Ok(request) => self.submit(request).await,
            Err(e) => {
                debug!("Rejecting transaction input: {}", e);
                TransactionOutcome::failed(&LinkError::from(e))
            }
        }
    }

    async fn submit(&self, request: TransactionRequest) -> TransactionOutcome {
        self.request(|response| CoordinatorCommand::Submit { request, response })
            .await
            .unwrap_or_else(|e| TransactionOutcome::failed(&e))
    }

    /// Ask the terminal whether it is alive
    pub async fn health_check(&self) -> HealthOutcome {
        if let Err(e) = self.limiter.check(HEALTH_CHANNEL) {
            return HealthOutcome::failed(&e);
        }
        self.request(|response| CoordinatorCommand::HealthCheck { response })
            .await
            .unwrap_or_else(|e| HealthOutcome::failed(&e))
    }

    /// Abandon the pending transaction; `Ok(false)` if none was pending
    pub async fn cancel_transaction(&self) -> Result<bool, LinkError> {
        self.request(|response| CoordinatorCommand::Cancel { response })
            .await
    }

    /// Attach a simulated terminal, replacing any active channel
    pub async fn open_simulator(&self, link: SimulatedLink) -> Result<ChannelMeta, LinkError> {
        self.request(|response| CoordinatorCommand::OpenSimulator { link, response })
            .await?
    }

    /// Close the simulator; `Ok(false)` if it was not the active channel
    pub async fn close_simulator(&self) -> Result<bool, LinkError> {
        self.request(|response| CoordinatorCommand::CloseSimulator { response })
            .await
    }

    /// Whether the simulator is the active channel
    pub async fn simulator_status(&self) -> SimulatorStatus {
        self.status()
            .await
            .map(|status| status.simulator)
            .unwrap_or_default()
    }

    /// Snapshot of the coordinator state
    pub async fn status(&self) -> Result<CoordinatorStatus, LinkError> {
        self.request(|response| CoordinatorCommand::QueryStatus { response })
            .await
    }

    /// Stop the coordinator, closing the active channel
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::Shutdown).await;
    }
}
