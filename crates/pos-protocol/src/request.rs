//! Validated transaction requests
//!
//! A [`TransactionRequest`] can only be built through validating
//! constructors, so anything that reaches the coordinator is already
//! known to be in range.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Largest accepted amount, in minor currency units
pub const MAX_AMOUNT: u64 = 10_000_000;

/// Largest accepted installment count
pub const MAX_INSTALLMENTS: u8 = 12;

/// Kind of payment operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TransactionKind {
    /// Card payment
    #[default]
    Sale,
    /// Refund to card
    Refund,
}

impl TransactionKind {
    /// Token used on the wire (always upper case)
    pub fn as_wire(&self) -> &'static str {
        match self {
            TransactionKind::Sale => "SALE",
            TransactionKind::Refund => "REFUND",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Sale => write!(f, "sale"),
            TransactionKind::Refund => write!(f, "refund"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    /// Case-insensitive: `sale`, `SALE` and `Sale` are all accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SALE" => Ok(TransactionKind::Sale),
            "REFUND" => Ok(TransactionKind::Refund),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

/// An immutable, validated payment request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransactionRequest {
    amount: u64,
    kind: TransactionKind,
    installments: u8,
}

impl TransactionRequest {
    /// Build a request, checking amount and installment bounds
    pub fn new(
        amount: u64,
        kind: TransactionKind,
        installments: u8,
    ) -> Result<Self, ValidationError> {
        if amount == 0 || amount > MAX_AMOUNT {
            return Err(ValidationError::AmountOutOfRange {
                got: i64::try_from(amount).unwrap_or(i64::MAX),
                max: MAX_AMOUNT,
            });
        }
        if installments == 0 || installments > MAX_INSTALLMENTS {
            return Err(ValidationError::InstallmentsOutOfRange {
                got: installments.into(),
                max: MAX_INSTALLMENTS,
            });
        }
        Ok(Self {
            amount,
            kind,
            installments,
        })
    }

    /// Single-installment sale
    pub fn sale(amount: u64) -> Result<Self, ValidationError> {
        Self::new(amount, TransactionKind::Sale, 1)
    }

    /// Amount in minor currency units
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn installments(&self) -> u8 {
        self.installments
    }
}

/// Loosely-typed request as it arrives from a caller
///
/// Mirrors what an untrusted front end would send: signed numbers and a
/// free-form kind string. Convert with `TryFrom` to get a
/// [`TransactionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionInput {
    pub amount: i64,
    #[cfg_attr(feature = "serde", serde(rename = "type", default = "default_kind"))]
    pub kind: String,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "installment", default = "default_installments")
    )]
    pub installments: i64,
}

#[cfg(feature = "serde")]
fn default_kind() -> String {
    "sale".to_string()
}

#[cfg(feature = "serde")]
fn default_installments() -> i64 {
    1
}

impl TryFrom<TransactionInput> for TransactionRequest {
    type Error = ValidationError;

    fn try_from(input: TransactionInput) -> Result<Self, Self::Error> {
        if input.amount <= 0 || input.amount as u64 > MAX_AMOUNT {
            return Err(ValidationError::AmountOutOfRange {
                got: input.amount,
                max: MAX_AMOUNT,
            });
        }
        let kind = input.kind.parse()?;
        let installments = u8::try_from(input.installments)
            .ok()
            .filter(|n| (1..=MAX_INSTALLMENTS).contains(n))
            .ok_or(ValidationError::InstallmentsOutOfRange {
                got: input.installments,
                max: MAX_INSTALLMENTS,
            })?;
        Self::new(input.amount as u64, kind, installments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_case_insensitive() {
        assert_eq!("sale".parse::<TransactionKind>(), Ok(TransactionKind::Sale));
        assert_eq!("SALE".parse::<TransactionKind>(), Ok(TransactionKind::Sale));
        assert_eq!("Refund".parse::<TransactionKind>(), Ok(TransactionKind::Refund));
        assert!("void".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_request_bounds() {
        assert!(TransactionRequest::new(5000, TransactionKind::Sale, 1).is_ok());
        assert!(TransactionRequest::new(MAX_AMOUNT, TransactionKind::Refund, 12).is_ok());

        assert!(matches!(
            TransactionRequest::new(0, TransactionKind::Sale, 1),
            Err(ValidationError::AmountOutOfRange { got: 0, .. })
        ));
        assert!(TransactionRequest::new(MAX_AMOUNT + 1, TransactionKind::Sale, 1).is_err());
        assert!(matches!(
            TransactionRequest::new(100, TransactionKind::Sale, 13),
            Err(ValidationError::InstallmentsOutOfRange { got: 13, .. })
        ));
        assert!(TransactionRequest::new(100, TransactionKind::Sale, 0).is_err());
    }

    #[test]
    fn test_input_conversion() {
        let input = TransactionInput {
            amount: 2500,
            kind: "refund".into(),
            installments: 3,
        };
        let req = TransactionRequest::try_from(input).unwrap();
        assert_eq!(req.amount(), 2500);
        assert_eq!(req.kind(), TransactionKind::Refund);
        assert_eq!(req.installments(), 3);

        let negative = TransactionInput {
            amount: -5,
            kind: "sale".into(),
            installments: 1,
        };
        assert!(matches!(
            TransactionRequest::try_from(negative),
            Err(ValidationError::AmountOutOfRange { got: -5, .. })
        ));

        let too_many = TransactionInput {
            amount: 100,
            kind: "sale".into(),
            installments: 300,
        };
        assert!(TransactionRequest::try_from(too_many).is_err());
    }
}
