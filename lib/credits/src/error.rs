//! Error types for the credits crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GateError`: why a generation attempt was refused
//! - `LedgerError`: the ledger store itself failed

use kelasi_core::UserId;
use std::fmt;

/// Why the gate refused a generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// No identity was presented, or it has no credit account.
    Unauthenticated,
    /// The account cannot cover the cost. Nothing was deducted.
    InsufficientCredits {
        user_id: UserId,
        balance: i64,
        cost: i64,
    },
    /// The ledger could not be consulted. Nothing was deducted.
    Ledger(LedgerError),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::InsufficientCredits {
                user_id,
                balance,
                cost,
            } => {
                write!(
                    f,
                    "user {user_id} has {balance} credits, {cost} required"
                )
            }
            Self::Ledger(err) => write!(f, "credit ledger unavailable: {err}"),
        }
    }
}

impl std::error::Error for GateError {}

impl From<LedgerError> for GateError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

/// Failures of the ledger store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The account does not exist.
    AccountNotFound { user_id: UserId },
    /// An amount was zero or negative.
    InvalidAmount { amount: i64 },
    /// The backing store failed.
    Storage { details: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountNotFound { user_id } => {
                write!(f, "no credit account for user {user_id}")
            }
            Self::InvalidAmount { amount } => {
                write!(f, "credit amount must be positive, got {amount}")
            }
            Self::Storage { details } => write!(f, "credit storage error: {details}"),
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_display() {
        let err = GateError::InsufficientCredits {
            user_id: UserId::new(),
            balance: 0,
            cost: 1,
        };
        assert!(err.to_string().contains("0 credits"));
    }

    #[test]
    fn ledger_error_converts_into_gate_error() {
        let err: GateError = LedgerError::Storage {
            details: "connection reset".to_string(),
        }
        .into();
        assert!(err.to_string().contains("connection reset"));
    }
}
