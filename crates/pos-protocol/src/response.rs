//! Inbound terminal responses
//!
//! A response is a single pipe-delimited line with up to six positional
//! fields:
//!
//! ```text
//! STATUS|MESSAGE|TRANSACTION_ID|AUTH_CODE|CARD_NUMBER|ERROR\r\n
//! ```
//!
//! Trailing fields may be omitted and any past the sixth are ignored.
//! Empty optional fields decode to `None`.

use std::fmt;

use crate::error::ParseError;
use crate::{EncodeCommand, FIELD_SEPARATOR, LINE_TERMINATOR, MAX_LINE_LEN};

/// Number of positional fields in a response line
pub const RESPONSE_FIELDS: usize = 6;

/// Status token reported by the terminal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseStatus {
    Success,
    Approved,
    Declined,
    Timeout,
    Error,
    Cancelled,
    /// Any other token, kept verbatim
    Other(String),
}

impl ResponseStatus {
    /// Map a raw token to a status (tokens are case sensitive)
    pub fn from_token(token: &str) -> Self {
        match token {
            "SUCCESS" => ResponseStatus::Success,
            "APPROVED" => ResponseStatus::Approved,
            "DECLINED" => ResponseStatus::Declined,
            "TIMEOUT" => ResponseStatus::Timeout,
            "ERROR" => ResponseStatus::Error,
            "CANCELLED" => ResponseStatus::Cancelled,
            other => ResponseStatus::Other(other.to_string()),
        }
    }

    /// The token as it appears on the wire
    pub fn as_token(&self) -> &str {
        match self {
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::Approved => "APPROVED",
            ResponseStatus::Declined => "DECLINED",
            ResponseStatus::Timeout => "TIMEOUT",
            ResponseStatus::Error => "ERROR",
            ResponseStatus::Cancelled => "CANCELLED",
            ResponseStatus::Other(token) => token,
        }
    }

    /// Only SUCCESS and APPROVED complete a payment
    pub fn is_positive(&self) -> bool {
        matches!(self, ResponseStatus::Success | ResponseStatus::Approved)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// One decoded response line
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseFrame {
    pub status: ResponseStatus,
    pub message: String,
    pub transaction_id: String,
    pub auth_code: Option<String>,
    /// Masked card number, e.g. `************1234`
    pub card_number: Option<String>,
    /// Vendor error token for negative outcomes
    pub error: Option<String>,
}

impl ResponseFrame {
    /// Frame with only a status and message
    pub fn new(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            transaction_id: String::new(),
            auth_code: None,
            card_number: None,
            error: None,
        }
    }

    /// Decode a raw line (terminator optional)
    pub fn decode(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.len() > MAX_LINE_LEN {
            return Err(ParseError::LineTooLong {
                len: raw.len(),
                max: MAX_LINE_LEN,
            });
        }
        let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidEncoding)?;
        Self::parse(line)
    }

    /// Decode a line that is already text
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        // Fields past the known layout are ignored
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).take(RESPONSE_FIELDS).collect();

        let status = fields[0].trim();
        if !is_status_token(status) {
            return Err(ParseError::InvalidStatus(status.to_string()));
        }

        let field = |i: usize| fields.get(i).map(|s| s.trim()).unwrap_or_default();
        let optional = |i: usize| Some(field(i)).filter(|s| !s.is_empty()).map(str::to_string);

        Ok(Self {
            status: ResponseStatus::from_token(status),
            message: field(1).to_string(),
            transaction_id: field(2).to_string(),
            auth_code: optional(3),
            card_number: optional(4),
            error: optional(5),
        })
    }

    /// Render the line without its terminator
    ///
    /// Separators and line breaks inside fields are replaced so the
    /// output always decodes back into the same number of fields.
    pub fn to_line(&self) -> String {
        let fields = [
            self.status.as_token(),
            self.message.as_str(),
            self.transaction_id.as_str(),
            self.auth_code.as_deref().unwrap_or_default(),
            self.card_number.as_deref().unwrap_or_default(),
            self.error.as_deref().unwrap_or_default(),
        ];
        fields
            .iter()
            .map(|f| sanitize_field(f))
            .collect::<Vec<_>>()
            .join(&FIELD_SEPARATOR.to_string())
    }
}

impl EncodeCommand for ResponseFrame {
    fn encode(&self) -> Vec<u8> {
        let mut line = self.to_line().into_bytes();
        line.extend_from_slice(LINE_TERMINATOR);
        line
    }
}

fn is_status_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn sanitize_field(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '|' => '/',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}
