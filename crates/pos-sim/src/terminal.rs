//! Virtual terminal state model
//!
//! A synchronous model of a payment terminal: it accepts command envelopes,
//! remembers the one transaction it is showing to the operator and queues
//! a response when the operator acts. The async task in
//! [`crate::task`] drives it.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pos_protocol::{ResponseStatus, SimulatorCommand, SimulatorResponse};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scenario::{CardBrand, OperatorAction, Scenario};

const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Scripted operator behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRespond {
    pub action: OperatorAction,
    /// Delay after a command is displayed
    pub delay_ms: u64,
}

impl AutoRespond {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Configuration for creating a virtual terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Display name/identifier
    pub id: String,
    /// Card presented when the operator approves
    pub card: CardBrand,
    pub scenario: Scenario,
    pub auto_respond: Option<AutoRespond>,
    /// Whether the operator surface is ready as soon as the task starts
    pub surface_ready: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            id: "Virtual POS".to_string(),
            card: CardBrand::Visa,
            scenario: Scenario::Success,
            auto_respond: None,
            surface_ready: true,
        }
    }
}

/// What the terminal did with a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDisposition {
    /// `TEST` answered immediately
    HealthCheck,
    /// Transaction shown to the operator
    Accepted {
        /// An unanswered transaction was replaced
        superseded: bool,
    },
    /// Dropped without a response
    Rejected(String),
}

/// A simulated payment terminal
#[derive(Debug)]
pub struct VirtualTerminal {
    id: String,
    card: CardBrand,
    scenario: Scenario,
    /// Transaction waiting for the operator
    active: Option<SimulatorCommand>,
    /// Responses not yet sent back
    pending_output: VecDeque<SimulatorResponse>,
}

impl VirtualTerminal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            card: CardBrand::default(),
            scenario: Scenario::default(),
            active: None,
            pending_output: VecDeque::new(),
        }
    }

    pub fn from_config(config: &TerminalConfig) -> Self {
        Self {
            card: config.card,
            scenario: config.scenario,
            ..Self::new(config.id.clone())
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn card(&self) -> CardBrand {
        self.card
    }

    pub fn set_card(&mut self, card: CardBrand) {
        self.card = card;
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn set_scenario(&mut self, scenario: Scenario) {
        self.scenario = scenario;
    }

    /// The transaction currently shown to the operator
    pub fn active_command(&self) -> Option<&SimulatorCommand> {
        self.active.as_ref()
    }

    /// Accept a command envelope
    pub fn receive_command(&mut self, command: SimulatorCommand) -> CommandDisposition {
        if command.is_test() {
            debug!("Virtual terminal {} answering TEST", self.id);
            self.pending_output.push_back(SimulatorResponse::new(
                ResponseStatus::Success,
                "Test successful - terminal responding",
            ));
            return CommandDisposition::HealthCheck;
        }

        match command.amount {
            Some(amount) if amount > 0 => {
                let superseded = self.active.replace(command).is_some();
                if superseded {
                    warn!(
                        "Virtual terminal {}: unanswered transaction replaced",
                        self.id
                    );
                }
                info!(
                    "Virtual terminal {} showing transaction of {} ({})",
                    self.id,
                    amount,
                    self.card.card().name
                );
                CommandDisposition::Accepted { superseded }
            }
            _ => {
                warn!(
                    "Virtual terminal {} rejected command without amount: {:?}",
                    self.id, command
                );
                CommandDisposition::Rejected("missing transaction amount".to_string())
            }
        }
    }

    /// Apply an operator action to the active transaction
    ///
    /// Returns false, queueing nothing, when no transaction is active.
    pub fn respond(&mut self, action: OperatorAction) -> bool {
        if self.active.take().is_none() {
            debug!(
                "Virtual terminal {} ignoring {:?} with no active transaction",
                self.id, action
            );
            return false;
        }

        let response = match action.fixed_response() {
            Some(response) => response,
            None => self.scenario_response(),
        };
        info!(
            "Virtual terminal {} responding {} ({:?})",
            self.id, response.status, response.error
        );
        self.pending_output.push_back(response);
        true
    }

    fn scenario_response(&self) -> SimulatorResponse {
        match self.scenario.failure() {
            Some((status, message, token)) => SimulatorResponse::failure(status, message, token),
            None => {
                let card = self.card.card();
                SimulatorResponse {
                    transaction_id: Some(generate_transaction_id()),
                    auth_code: Some(generate_auth_code()),
                    card_number: Some(card.number.to_string()),
                    card_bank: Some(card.bank.to_string()),
                    ..SimulatorResponse::new(ResponseStatus::Success, "Transaction successful")
                }
            }
        }
    }

    /// Take the next queued response, if any
    pub fn take_output(&mut self) -> Option<SimulatorResponse> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// `TXN` followed by the wall-clock millis and nine random characters
pub fn generate_transaction_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("TXN{}{}", millis, random_token(9))
}

/// Six random uppercase alphanumerics
pub fn generate_auth_code() -> String {
    random_token(6)
}
