//! Caller-facing results
//!
//! Failures are values: every request resolves to an outcome with
//! `success` set one way or the other, never to a panic or a hung future.

use std::time::SystemTime;

use pos_protocol::ResponseFrame;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;

const DEFAULT_APPROVED_MESSAGE: &str = "Transaction approved";
const DEFAULT_DECLINED_MESSAGE: &str = "Transaction declined";

/// Result of a payment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub success: bool,
    pub message: String,
    pub transaction_id: Option<String>,
    pub auth_code: Option<String>,
    pub card_number: Option<String>,
    /// Error code for failures (`TIMEOUT`, `BUSY`, a vendor token, ...)
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl TransactionOutcome {
    /// Interpret a decoded response frame
    ///
    /// A positive status without a transaction id is treated as unreadable,
    /// so every successful outcome carries one.
    pub fn from_frame(frame: &ResponseFrame) -> Self {
        if frame.status.is_positive() {
            if frame.transaction_id.is_empty() {
                return Self::failed(&LinkError::ParseFailure(format!(
                    "{} response without transaction id",
                    frame.status
                )));
            }
            return Self {
                success: true,
                message: non_empty_or(&frame.message, DEFAULT_APPROVED_MESSAGE),
                transaction_id: Some(frame.transaction_id.clone()),
                auth_code: frame.auth_code.clone(),
                card_number: frame.card_number.clone(),
                error: None,
                timestamp: SystemTime::now(),
            };
        }

        let code = frame
            .error
            .clone()
            .unwrap_or_else(|| frame.status.as_token().to_string());
        Self::failed(&LinkError::Declined {
            code,
            message: non_empty_or(&frame.message, DEFAULT_DECLINED_MESSAGE),
        })
    }

    /// Failure outcome for a link error
    pub fn failed(err: &LinkError) -> Self {
        let message = match err {
            LinkError::Declined { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            success: false,
            message,
            transaction_id: None,
            auth_code: None,
            card_number: None,
            error: Some(err.error_code().to_string()),
            timestamp: SystemTime::now(),
        }
    }

    /// Error code, if this is a failure
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Result of a liveness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthOutcome {
    pub success: bool,
    pub message: String,
}

impl HealthOutcome {
    pub fn alive() -> Self {
        Self {
            success: true,
            message: "Terminal responded".to_string(),
        }
    }

    pub fn failed(err: &LinkError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
        }
    }
}

/// Outcome types that can be produced from a link error
///
/// Lets a pending slot fail itself on timeout or close without knowing
/// which kind of request it holds.
pub trait FailureOutcome {
    fn from_error(err: &LinkError) -> Self;
}

impl FailureOutcome for TransactionOutcome {
    fn from_error(err: &LinkError) -> Self {
        Self::failed(err)
    }
}

impl FailureOutcome for HealthOutcome {
    fn from_error(err: &LinkError) -> Self {
        Self::failed(err)
    }
}

fn non_empty_or(s: &str, fallback: &str) -> String {
    if s.trim().is_empty() {
        fallback.to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(line: &str) -> ResponseFrame {
        ResponseFrame::parse(line).unwrap()
    }

    #[test]
    fn test_positive_frame() {
        let outcome = TransactionOutcome::from_frame(&frame("SUCCESS|Approved|TXN123|AUTH99"));
        assert!(outcome.success);
        assert_eq!(outcome.message, "Approved");
        assert_eq!(outcome.transaction_id.as_deref(), Some("TXN123"));
        assert_eq!(outcome.auth_code.as_deref(), Some("AUTH99"));
        assert_eq!(outcome.error, None);

        let approved = TransactionOutcome::from_frame(&frame("APPROVED||TXN9"));
        assert!(approved.success);
        assert_eq!(approved.message, DEFAULT_APPROVED_MESSAGE);
    }

    #[test]
    fn test_positive_without_transaction_id() {
        let outcome = TransactionOutcome::from_frame(&frame("SUCCESS|Approved"));
        assert!(!outcome.success);
        assert_eq!(outcome.error_code(), Some("PARSE_ERROR"));
    }

    #[test]
    fn test_negative_uses_decline_reason() {
        let outcome = TransactionOutcome::from_frame(&frame("DECLINED|Insufficient funds|||"));
        assert!(!outcome.success);
        assert_eq!(outcome.error_code(), Some("DECLINED"));
        assert_eq!(outcome.message, "Insufficient funds");

        let with_reason =
            TransactionOutcome::from_frame(&frame("DECLINED|No|||************1234|WRONG_PIN"));
        assert_eq!(with_reason.error_code(), Some("WRONG_PIN"));
    }

    #[test]
    fn test_unknown_status_surfaces_raw_token() {
        let outcome = TransactionOutcome::from_frame(&frame("VOIDED"));
        assert!(!outcome.success);
        assert_eq!(outcome.error_code(), Some("VOIDED"));
        assert_eq!(outcome.message, DEFAULT_DECLINED_MESSAGE);
    }

    #[test]
    fn test_failed_outcome_json() {
        let outcome = TransactionOutcome::failed(&LinkError::Timeout);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "TIMEOUT");
        assert!(json["transactionId"].is_null());
    }
}
