//! Virtual terminal actor task
//!
//! This module provides an async task that owns a [`VirtualTerminal`] and
//! talks to the coordinator over a pair of envelope channels. The task uses
//! a select! loop to:
//! - Receive command envelopes, holding them until the operator surface
//!   reports ready
//! - Apply operator controls (approve, decline, cancel, scenario changes)
//! - Fire a scripted auto-response once its delay has passed
//! - Emit state events via a broadcast channel
//!
//! The task ends when the surface is closed or either link closes. Its
//! response sender is dropped on exit, which the coordinator sees as the
//! simulator going away.

use std::collections::VecDeque;

use pos_protocol::{SimulatorCommand, SimulatorResponse};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::scenario::{CardBrand, OperatorAction, Scenario};
use crate::terminal::{AutoRespond, CommandDisposition, TerminalConfig, VirtualTerminal};

/// Controls for a running virtual terminal
#[derive(Debug, Clone)]
pub enum TerminalControl {
    /// The operator surface finished loading
    SurfaceReady,
    Operator(OperatorAction),
    SetScenario(Scenario),
    SetCard(CardBrand),
    SetAutoRespond(Option<AutoRespond>),
    /// Close the surface and stop the task
    Close,
}

/// State event emitted for the operator surface
#[derive(Debug, Clone)]
pub enum TerminalStateEvent {
    SurfaceReady,
    /// Command held until the surface is ready
    CommandQueued(SimulatorCommand),
    /// Command shown to the operator
    CommandDisplayed(SimulatorCommand),
    CommandRejected { reason: String },
    ResponseSent(SimulatorResponse),
    Closed,
}

/// Envelope channels for the coordinator side of a virtual terminal
#[derive(Debug)]
pub struct TerminalLink {
    pub command_tx: mpsc::Sender<SimulatorCommand>,
    pub response_rx: mpsc::Receiver<SimulatorResponse>,
}

struct TerminalTask {
    terminal: VirtualTerminal,
    response_tx: mpsc::Sender<SimulatorResponse>,
    state_tx: broadcast::Sender<TerminalStateEvent>,
    surface_ready: bool,
    /// Commands received before the surface was ready
    queued: VecDeque<SimulatorCommand>,
    auto_respond: Option<AutoRespond>,
    auto_deadline: Option<Instant>,
}

impl TerminalTask {
    fn emit(&self, event: TerminalStateEvent) {
        let _ = self.state_tx.send(event);
    }

    async fn on_command(&mut self, command: SimulatorCommand) -> Result<(), SimError> {
        if !self.surface_ready {
            debug!(
                "Virtual terminal {} queueing {:?} until surface is ready",
                self.terminal.id(),
                command.command
            );
            self.queued.push_back(command.clone());
            self.emit(TerminalStateEvent::CommandQueued(command));
            return Ok(());
        }
        self.deliver(command).await
    }

    async fn deliver(&mut self, command: SimulatorCommand) -> Result<(), SimError> {
        match self.terminal.receive_command(command.clone()) {
            CommandDisposition::HealthCheck => {}
            CommandDisposition::Accepted { .. } => {
                self.emit(TerminalStateEvent::CommandDisplayed(command));
                self.auto_deadline = self
                    .auto_respond
                    .map(|auto| Instant::now() + auto.delay());
            }
            CommandDisposition::Rejected(reason) => {
                self.emit(TerminalStateEvent::CommandRejected { reason });
            }
        }
        self.flush_output().await
    }

    /// Flush commands held while the surface was loading, exactly once
    async fn on_surface_ready(&mut self) -> Result<(), SimError> {
        if self.surface_ready {
            return Ok(());
        }
        self.surface_ready = true;
        info!(
            "Virtual terminal {} surface ready, delivering {} queued command(s)",
            self.terminal.id(),
            self.queued.len()
        );
        self.emit(TerminalStateEvent::SurfaceReady);
        while let Some(command) = self.queued.pop_front() {
            self.deliver(command).await?;
        }
        Ok(())
    }

    async fn operator(&mut self, action: OperatorAction) -> Result<(), SimError> {
        self.auto_deadline = None;
        if self.terminal.respond(action) {
            self.flush_output().await?;
        }
        Ok(())
    }

    async fn flush_output(&mut self) -> Result<(), SimError> {
        while let Some(response) = self.terminal.take_output() {
            self.response_tx
                .send(response.clone())
                .await
                .map_err(|_| SimError::Closed)?;
            self.emit(TerminalStateEvent::ResponseSent(response));
        }
        Ok(())
    }

    /// Returns false when the task should stop
    async fn on_control(&mut self, control: TerminalControl) -> Result<bool, SimError> {
        match control {
            TerminalControl::SurfaceReady => self.on_surface_ready().await?,
            TerminalControl::Operator(action) => self.operator(action).await?,
            TerminalControl::SetScenario(scenario) => {
                debug!("Virtual terminal {} scenario {}", self.terminal.id(), scenario);
                self.terminal.set_scenario(scenario);
            }
            TerminalControl::SetCard(card) => self.terminal.set_card(card),
            TerminalControl::SetAutoRespond(auto) => {
                self.auto_respond = auto;
                if auto.is_none() {
                    self.auto_deadline = None;
                }
            }
            TerminalControl::Close => {
                info!("Virtual terminal {} surface closed", self.terminal.id());
                return Ok(false);
            }
        }
        Ok(true)
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run the virtual terminal actor task
pub async fn run_terminal_task(
    config: TerminalConfig,
    mut command_rx: mpsc::Receiver<SimulatorCommand>,
    response_tx: mpsc::Sender<SimulatorResponse>,
    mut control_rx: mpsc::Receiver<TerminalControl>,
    state_tx: broadcast::Sender<TerminalStateEvent>,
) {
    let mut task = TerminalTask {
        terminal: VirtualTerminal::from_config(&config),
        response_tx,
        state_tx,
        surface_ready: false,
        queued: VecDeque::new(),
        auto_respond: config.auto_respond,
        auto_deadline: None,
    };

    info!("Starting virtual terminal task for {}", task.terminal.id());

    let result = if config.surface_ready {
        task.on_surface_ready().await
    } else {
        Ok(())
    };

    if result.is_ok() {
        loop {
            let result = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => task.on_command(command).await,
                    None => {
                        debug!("Command link closed for virtual terminal {}", task.terminal.id());
                        break;
                    }
                },

                control = control_rx.recv() => match control {
                    Some(control) => match task.on_control(control).await {
                        Ok(true) => Ok(()),
                        Ok(false) => break,
                        Err(e) => Err(e),
                    },
                    None => break,
                },

                _ = wait_for(task.auto_deadline) => {
                    let action = task.auto_respond.map(|auto| auto.action);
                    task.auto_deadline = None;
                    match action {
                        Some(action) => task.operator(action).await,
                        None => Ok(()),
                    }
                }
            };

            if let Err(e) = result {
                warn!("Virtual terminal {} stopping: {}", task.terminal.id(), e);
                break;
            }
        }
    }

    task.emit(TerminalStateEvent::Closed);
    info!("Virtual terminal task ended for {}", task.terminal.id());
}

/// Handle to a spawned virtual terminal
#[derive(Debug)]
pub struct TerminalHandle {
    control_tx: mpsc::Sender<TerminalControl>,
    state_tx: broadcast::Sender<TerminalStateEvent>,
    task: JoinHandle<()>,
}

impl TerminalHandle {
    /// Subscribe to operator-facing state events
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalStateEvent> {
        self.state_tx.subscribe()
    }

    pub async fn control(&self, control: TerminalControl) -> Result<(), SimError> {
        self.control_tx
            .send(control)
            .await
            .map_err(|_| SimError::Closed)
    }

    pub async fn surface_ready(&self) -> Result<(), SimError> {
        self.control(TerminalControl::SurfaceReady).await
    }

    pub async fn approve(&self) -> Result<(), SimError> {
        self.control(TerminalControl::Operator(OperatorAction::Approve))
            .await
    }

    pub async fn decline(&self) -> Result<(), SimError> {
        self.control(TerminalControl::Operator(OperatorAction::Decline))
            .await
    }

    pub async fn cancel(&self) -> Result<(), SimError> {
        self.control(TerminalControl::Operator(OperatorAction::Cancel))
            .await
    }

    pub async fn set_scenario(&self, scenario: Scenario) -> Result<(), SimError> {
        self.control(TerminalControl::SetScenario(scenario)).await
    }

    /// Close the surface and wait for the task to finish
    pub async fn close(self) {
        let _ = self.control_tx.send(TerminalControl::Close).await;
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a virtual terminal task
///
/// Returns the coordinator-side envelope channels and a handle for the
/// operator side. Must be called from within a tokio runtime.
pub fn spawn_virtual_terminal(config: TerminalConfig) -> (TerminalLink, TerminalHandle) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (response_tx, response_rx) = mpsc::channel(16);
    let (control_tx, control_rx) = mpsc::channel(16);
    let (state_tx, _) = broadcast::channel(64);

    let task = tokio::spawn(run_terminal_task(
        config,
        command_rx,
        response_tx,
        control_rx,
        state_tx.clone(),
    ));

    (
        TerminalLink {
            command_tx,
            response_rx,
        },
        TerminalHandle {
            control_tx,
            state_tx,
            task,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_protocol::{TerminalCommand, TransactionRequest};
    use std::time::Duration;

    fn sale(amount: u64) -> SimulatorCommand {
        SimulatorCommand::from_command(&TerminalCommand::Transaction(
            TransactionRequest::sale(amount).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_commands_wait_for_surface() {
        let config = TerminalConfig {
            surface_ready: false,
            ..Default::default()
        };
        let (mut link, handle) = spawn_virtual_terminal(config);
        let mut state = handle.subscribe();

        link.command_tx.send(sale(100)).await.unwrap();
        assert!(matches!(
            state.recv().await.unwrap(),
            TerminalStateEvent::CommandQueued(_)
        ));

        // Approving before the surface is ready has nothing to act on
        handle.approve().await.unwrap();
        handle.surface_ready().await.unwrap();
        assert!(matches!(
            state.recv().await.unwrap(),
            TerminalStateEvent::SurfaceReady
        ));
        assert!(matches!(
            state.recv().await.unwrap(),
            TerminalStateEvent::CommandDisplayed(c) if c.amount == Some(100)
        ));

        // A second ready signal must not redeliver
        handle.surface_ready().await.unwrap();
        handle.approve().await.unwrap();
        let response = link.response_rx.recv().await.unwrap();
        assert!(response.success);

        handle.close().await;
        assert!(link.response_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_test_command_answered_without_operator() {
        let (mut link, handle) = spawn_virtual_terminal(TerminalConfig::default());
        link.command_tx
            .send(SimulatorCommand::from_command(&TerminalCommand::HealthCheck))
            .await
            .unwrap();
        let response = link.response_rx.recv().await.unwrap();
        assert_eq!(response.status, "SUCCESS");
        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_respond_after_delay() {
        let config = TerminalConfig {
            scenario: Scenario::Declined,
            auto_respond: Some(AutoRespond {
                action: OperatorAction::Approve,
                delay_ms: 2_000,
            }),
            ..Default::default()
        };
        let (mut link, handle) = spawn_virtual_terminal(config);
        let started = Instant::now();

        link.command_tx.send(sale(100)).await.unwrap();
        let response = link.response_rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(response.error.as_deref(), Some("CARD_DECLINED"));
        handle.close().await;
    }

    #[tokio::test]
    async fn test_dropping_command_link_ends_task() {
        let (link, handle) = spawn_virtual_terminal(TerminalConfig::default());
        let TerminalLink {
            command_tx,
            mut response_rx,
        } = link;
        drop(command_tx);
        assert!(response_rx.recv().await.is_none());
        handle.close().await;
    }
}
