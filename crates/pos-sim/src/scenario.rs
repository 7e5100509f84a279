//! Test scenarios, operator actions and the virtual card catalogue
//!
//! A scenario decides what the terminal answers when the operator approves
//! a transaction. Decline and cancel always produce their own fixed
//! responses regardless of the selected scenario.

use std::fmt;
use std::str::FromStr;

use pos_protocol::{ResponseStatus, SimulatorResponse};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Outcome produced when the operator approves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Success,
    Declined,
    Timeout,
    Insufficient,
    InvalidCard,
    PinError,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Success,
        Scenario::Declined,
        Scenario::Timeout,
        Scenario::Insufficient,
        Scenario::InvalidCard,
        Scenario::PinError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Success => "success",
            Scenario::Declined => "declined",
            Scenario::Timeout => "timeout",
            Scenario::Insufficient => "insufficient",
            Scenario::InvalidCard => "invalid_card",
            Scenario::PinError => "pin_error",
        }
    }

    /// Status, message and vendor error token for a failing scenario
    ///
    /// `None` for [`Scenario::Success`], whose response needs card data.
    pub fn failure(&self) -> Option<(ResponseStatus, &'static str, &'static str)> {
        match self {
            Scenario::Success => None,
            Scenario::Declined => Some((ResponseStatus::Declined, "Card declined", "CARD_DECLINED")),
            Scenario::Timeout => Some((ResponseStatus::Timeout, "Transaction timed out", "TIMEOUT")),
            Scenario::Insufficient => Some((
                ResponseStatus::Declined,
                "Insufficient funds",
                "INSUFFICIENT_FUNDS",
            )),
            Scenario::InvalidCard => Some((ResponseStatus::Error, "Invalid card", "INVALID_CARD")),
            Scenario::PinError => Some((ResponseStatus::Declined, "Wrong PIN", "WRONG_PIN")),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SimError::UnknownScenario(s.to_string()))
    }
}

/// What the operator did on the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorAction {
    /// Accept the card; the selected scenario decides the response
    Approve,
    Decline,
    Cancel,
}

impl OperatorAction {
    /// Fixed response for decline and cancel
    pub fn fixed_response(&self) -> Option<SimulatorResponse> {
        match self {
            OperatorAction::Approve => None,
            OperatorAction::Decline => Some(SimulatorResponse::failure(
                ResponseStatus::Declined,
                "Transaction declined",
                "USER_DECLINED",
            )),
            OperatorAction::Cancel => Some(SimulatorResponse::failure(
                ResponseStatus::Cancelled,
                "Transaction cancelled",
                "USER_CANCELLED",
            )),
        }
    }
}

impl FromStr for OperatorAction {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "a" | "y" => Ok(OperatorAction::Approve),
            "decline" | "d" | "n" => Ok(OperatorAction::Decline),
            "cancel" | "c" => Ok(OperatorAction::Cancel),
            other => Err(SimError::UnknownAction(other.to_string())),
        }
    }
}

/// Credit or debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    Credit,
    Debit,
}

/// A card the virtual terminal pretends to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualCard {
    pub name: &'static str,
    /// Masked card number
    pub number: &'static str,
    pub card_type: CardType,
    pub bank: &'static str,
}

/// Cards available in the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    #[default]
    Visa,
    Mastercard,
    Amex,
    Troy,
    Bonus,
    World,
    Paraf,
    Maximum,
}

impl CardBrand {
    pub const ALL: [CardBrand; 8] = [
        CardBrand::Visa,
        CardBrand::Mastercard,
        CardBrand::Amex,
        CardBrand::Troy,
        CardBrand::Bonus,
        CardBrand::World,
        CardBrand::Paraf,
        CardBrand::Maximum,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Amex => "amex",
            CardBrand::Troy => "troy",
            CardBrand::Bonus => "bonus",
            CardBrand::World => "world",
            CardBrand::Paraf => "paraf",
            CardBrand::Maximum => "maximum",
        }
    }

    pub fn card(&self) -> VirtualCard {
        let (name, number, card_type, bank) = match self {
            CardBrand::Visa => ("Visa", "************1234", CardType::Credit, "İş Bankası"),
            CardBrand::Mastercard => (
                "Mastercard",
                "************5678",
                CardType::Credit,
                "Garanti BBVA",
            ),
            CardBrand::Amex => (
                "American Express",
                "************9012",
                CardType::Credit,
                "American Express",
            ),
            CardBrand::Troy => ("Troy", "************3456", CardType::Debit, "Akbank"),
            CardBrand::Bonus => ("Bonus", "************7890", CardType::Credit, "Garanti BBVA"),
            CardBrand::World => ("World", "************2468", CardType::Credit, "Yapı Kredi"),
            CardBrand::Paraf => ("Paraf", "************1357", CardType::Credit, "İş Bankası"),
            CardBrand::Maximum => ("Maximum", "************9753", CardType::Credit, "İş Bankası"),
        };
        VirtualCard {
            name,
            number,
            card_type,
            bank,
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CardBrand {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        CardBrand::ALL
            .into_iter()
            .find(|brand| brand.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| SimError::UnknownCard(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
        assert_eq!("PIN_ERROR".parse::<Scenario>().unwrap(), Scenario::PinError);
        assert!(matches!(
            "lucky".parse::<Scenario>(),
            Err(SimError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_failure_tokens() {
        assert_eq!(Scenario::Success.failure(), None);
        let (status, _, token) = Scenario::Insufficient.failure().unwrap();
        assert_eq!(status, ResponseStatus::Declined);
        assert_eq!(token, "INSUFFICIENT_FUNDS");
        let (status, _, token) = Scenario::InvalidCard.failure().unwrap();
        assert_eq!(status, ResponseStatus::Error);
        assert_eq!(token, "INVALID_CARD");
    }

    #[test]
    fn test_operator_fixed_responses() {
        assert!(OperatorAction::Approve.fixed_response().is_none());

        let declined = OperatorAction::Decline.fixed_response().unwrap();
        assert_eq!(declined.status, "DECLINED");
        assert_eq!(declined.error.as_deref(), Some("USER_DECLINED"));

        let cancelled = OperatorAction::Cancel.fixed_response().unwrap();
        assert_eq!(cancelled.status, "CANCELLED");
        assert_eq!(cancelled.error.as_deref(), Some("USER_CANCELLED"));
        assert!(!cancelled.success);
    }

    #[test]
    fn test_card_catalogue() {
        assert_eq!(CardBrand::ALL.len(), 8);
        let troy = "troy".parse::<CardBrand>().unwrap().card();
        assert_eq!(troy.number, "************3456");
        assert_eq!(troy.card_type, CardType::Debit);
        assert_eq!(CardBrand::World.card().bank, "Yapı Kredi");
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("APPROVE".parse::<OperatorAction>().unwrap(), OperatorAction::Approve);
        assert_eq!("c".parse::<OperatorAction>().unwrap(), OperatorAction::Cancel);
        assert!("maybe".parse::<OperatorAction>().is_err());
    }
}
