//! Outbound terminal commands
//!
//! Two commands exist on the wire:
//!
//! - `SALE|5000|1\r\n` / `REFUND|5000|1\r\n` start a payment
//! - `TEST\r\n` asks the terminal to prove it is alive

use std::fmt;

use crate::error::ParseError;
use crate::request::{TransactionKind, TransactionRequest};
use crate::{EncodeCommand, FIELD_SEPARATOR, LINE_TERMINATOR};

/// Literal health-check token
pub const HEALTH_CHECK_TOKEN: &str = "TEST";

/// A command sent to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Start a payment operation
    Transaction(TransactionRequest),
    /// Liveness probe
    HealthCheck,
}

impl TerminalCommand {
    /// Render the command line without its terminator
    pub fn to_line(&self) -> String {
        match self {
            TerminalCommand::Transaction(req) => format!(
                "{}{sep}{}{sep}{}",
                req.kind().as_wire(),
                req.amount(),
                req.installments(),
                sep = FIELD_SEPARATOR
            ),
            TerminalCommand::HealthCheck => HEALTH_CHECK_TOKEN.to_string(),
        }
    }

    /// Parse a command line as a terminal would receive it
    ///
    /// Accepts the line with or without its CRLF terminator. Used by
    /// simulated terminals that sit behind a byte stream.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if line == HEALTH_CHECK_TOKEN {
            return Ok(TerminalCommand::HealthCheck);
        }

        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        let [kind, amount, installments] = fields.as_slice() else {
            return Err(ParseError::UnknownCommand(line.to_string()));
        };

        let kind: TransactionKind = kind
            .parse()
            .map_err(|_| ParseError::UnknownCommand(line.to_string()))?;
        let amount = amount.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
            field: "amount",
            value: amount.to_string(),
        })?;
        let installments = installments
            .parse::<u8>()
            .map_err(|_| ParseError::InvalidNumber {
                field: "installments",
                value: installments.to_string(),
            })?;

        TransactionRequest::new(amount, kind, installments)
            .map(TerminalCommand::Transaction)
            .map_err(|e| ParseError::UnknownCommand(e.to_string()))
    }

    /// Whether this is the liveness probe
    pub fn is_health_check(&self) -> bool {
        matches!(self, TerminalCommand::HealthCheck)
    }
}

impl EncodeCommand for TerminalCommand {
    fn encode(&self) -> Vec<u8> {
        let mut line = self.to_line().into_bytes();
        line.extend_from_slice(LINE_TERMINATOR);
        line
    }
}

impl fmt::Display for TerminalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_sale() {
        let req = TransactionRequest::new(5000, TransactionKind::Sale, 1).unwrap();
        let cmd = TerminalCommand::Transaction(req);
        assert_eq!(cmd.encode(), b"SALE|5000|1\r\n");
    }

    #[test]
    fn test_encode_refund_with_installments() {
        let req = TransactionRequest::new(129_900, TransactionKind::Refund, 6).unwrap();
        assert_eq!(
            TerminalCommand::Transaction(req).encode(),
            b"REFUND|129900|6\r\n"
        );
    }

    #[test]
    fn test_encode_health_check() {
        assert_eq!(TerminalCommand::HealthCheck.encode(), b"TEST\r\n");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(TerminalCommand::parse("\r\n"), Err(ParseError::Empty));
        assert!(matches!(
            TerminalCommand::parse("PING"),
            Err(ParseError::UnknownCommand(_))
        ));
        assert!(matches!(
            TerminalCommand::parse("SALE|abc|1"),
            Err(ParseError::InvalidNumber { field: "amount", .. })
        ));
        assert!(TerminalCommand::parse("SALE|100|0").is_err());
    }

    #[test]
    fn test_parse_lowercase_kind() {
        let cmd = TerminalCommand::parse("sale|100|2\r\n").unwrap();
        let TerminalCommand::Transaction(req) = cmd else {
            panic!("expected transaction");
        };
        assert_eq!(req.kind(), TransactionKind::Sale);
        assert_eq!(req.installments(), 2);
    }

    fn kind() -> impl Strategy<Value = TransactionKind> {
        prop_oneof![Just(TransactionKind::Sale), Just(TransactionKind::Refund)]
    }

    proptest! {
        #[test]
        fn encoded_command_parses_back(
            amount in 1u64..=crate::MAX_AMOUNT,
            kind in kind(),
            installments in 1u8..=crate::MAX_INSTALLMENTS,
        ) {
            let req = TransactionRequest::new(amount, kind, installments).unwrap();
            let cmd = TerminalCommand::Transaction(req);
            let bytes = cmd.encode();
            let line = std::str::from_utf8(&bytes).unwrap();
            prop_assert!(line.ends_with("\r\n"));
            prop_assert_eq!(TerminalCommand::parse(line).unwrap(), cmd);
        }
    }
}
