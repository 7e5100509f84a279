//! In-process envelopes exchanged with a simulated terminal
//!
//! A simulated terminal does not see wire bytes. It receives a
//! [`SimulatorCommand`] object and answers with a [`SimulatorResponse`],
//! which converts into the same [`ResponseFrame`] a serial terminal would
//! produce.

use std::time::SystemTime;

use crate::command::TerminalCommand;
use crate::request::TransactionKind;
use crate::response::{ResponseFrame, ResponseStatus};

/// Command name carried in a simulator envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum CommandName {
    Sale,
    Test,
    /// Generic transaction (kind taken from the `type` field)
    Transaction,
}

/// Command object delivered to a simulated terminal
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulatorCommand {
    pub command: CommandName,
    pub amount: Option<u64>,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: Option<TransactionKind>,
    pub installment: Option<u8>,
    pub timestamp: SystemTime,
}

impl SimulatorCommand {
    /// Wrap a terminal command for in-process delivery
    pub fn from_command(command: &TerminalCommand) -> Self {
        match command {
            TerminalCommand::Transaction(req) => Self {
                command: CommandName::Sale,
                amount: Some(req.amount()),
                kind: Some(req.kind()),
                installment: Some(req.installments()),
                timestamp: SystemTime::now(),
            },
            TerminalCommand::HealthCheck => Self {
                command: CommandName::Test,
                amount: None,
                kind: None,
                installment: None,
                timestamp: SystemTime::now(),
            },
        }
    }

    pub fn is_test(&self) -> bool {
        self.command == CommandName::Test
    }
}

/// Response object produced by a simulated terminal
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SimulatorResponse {
    pub success: bool,
    pub status: String,
    pub message: String,
    pub transaction_id: Option<String>,
    pub auth_code: Option<String>,
    pub card_number: Option<String>,
    pub card_bank: Option<String>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl SimulatorResponse {
    /// Response with no card data
    pub fn new(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            success: status.is_positive(),
            status: status.as_token().to_string(),
            message: message.into(),
            transaction_id: None,
            auth_code: None,
            card_number: None,
            card_bank: None,
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Negative response carrying a vendor error token
    pub fn failure(
        status: ResponseStatus,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(status, message)
        }
    }

    /// Convert into the frame a serial terminal would have sent
    ///
    /// An empty status becomes `UNKNOWN`, which decodes as a negative
    /// outcome.
    pub fn to_frame(&self) -> ResponseFrame {
        let status = if self.status.trim().is_empty() {
            ResponseStatus::Other("UNKNOWN".to_string())
        } else {
            ResponseStatus::from_token(self.status.trim())
        };
        ResponseFrame {
            status,
            message: self.message.clone(),
            transaction_id: self.transaction_id.clone().unwrap_or_default(),
            auth_code: self.auth_code.clone(),
            card_number: self.card_number.clone(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::TransactionRequest;
    use crate::EncodeCommand;

    #[test]
    fn test_command_from_transaction() {
        let req = TransactionRequest::new(7500, TransactionKind::Refund, 3).unwrap();
        let cmd = SimulatorCommand::from_command(&TerminalCommand::Transaction(req));
        assert_eq!(cmd.command, CommandName::Sale);
        assert_eq!(cmd.amount, Some(7500));
        assert_eq!(cmd.kind, Some(TransactionKind::Refund));
        assert_eq!(cmd.installment, Some(3));
        assert!(!cmd.is_test());

        let test = SimulatorCommand::from_command(&TerminalCommand::HealthCheck);
        assert!(test.is_test());
        assert_eq!(test.amount, None);
    }

    #[test]
    fn test_response_to_frame_line() {
        let mut resp = SimulatorResponse::new(ResponseStatus::Success, "Approved");
        resp.transaction_id = Some("TXN42".into());
        resp.auth_code = Some("A1B2C3".into());
        resp.card_number = Some("************1234".into());
        resp.card_bank = Some("Garanti BBVA".into());

        assert!(resp.success);
        assert_eq!(
            resp.to_frame().encode(),
            b"SUCCESS|Approved|TXN42|A1B2C3|************1234|\r\n"
        );
    }

    #[test]
    fn test_empty_status_is_unknown() {
        let mut resp = SimulatorResponse::failure(ResponseStatus::Error, "", "INVALID_CARD");
        resp.status.clear();
        let frame = resp.to_frame();
        assert_eq!(frame.status.as_token(), "UNKNOWN");
        assert!(!frame.status.is_positive());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_envelope_json_shape() {
        let req = TransactionRequest::sale(5000).unwrap();
        let cmd = SimulatorCommand::from_command(&TerminalCommand::Transaction(req));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command"], "SALE");
        assert_eq!(json["type"], "sale");
        assert_eq!(json["installment"], 1);

        let resp = SimulatorResponse::failure(ResponseStatus::Declined, "No", "WRONG_PIN");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "WRONG_PIN");
        assert!(json.get("transactionId").is_some());
    }
}
