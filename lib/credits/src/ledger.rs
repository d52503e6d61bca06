//! The credit ledger gate contract.

use crate::error::{GateError, LedgerError};
use async_trait::async_trait;
use kelasi_core::UserId;
use rootcause::prelude::Report;
use serde::Serialize;

/// A successful deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deduction {
    /// Account that paid.
    pub user_id: UserId,
    /// Credits taken.
    pub charged: i64,
    /// Balance left after the deduction.
    pub remaining: i64,
}

/// Result of passing through the gate.
pub type GateOutcome = Result<Deduction, Report<GateError>>;

/// A store of per-user credit balances.
///
/// Implementations own persistence. The only mutation paths are
/// [`try_deduct`](CreditLedger::try_deduct), which must check and decrement
/// in one indivisible step, and [`grant`](CreditLedger::grant).
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Deducts `cost` credits if and only if the balance covers it.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the user has no account
    /// - `InsufficientCredits` if the balance is below `cost`; nothing is deducted
    /// - `Ledger` if the store fails
    async fn try_deduct(&self, user_id: UserId, cost: i64) -> GateOutcome;

    /// Returns the current balance.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for unknown users, or `Storage` on store failure.
    async fn balance(&self, user_id: UserId) -> Result<i64, Report<LedgerError>>;

    /// Creates an account with `initial` credits. Opening an existing account
    /// leaves it untouched.
    ///
    /// Returns the account's balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a negative initial balance, or `Storage`.
    async fn open_account(&self, user_id: UserId, initial: i64)
    -> Result<i64, Report<LedgerError>>;

    /// Adds `amount` credits to an existing account, returning the new balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AccountNotFound`, or `Storage`.
    async fn grant(&self, user_id: UserId, amount: i64) -> Result<i64, Report<LedgerError>>;

    /// The gate: authorizes a generation attempt and pays for it.
    ///
    /// Fails closed. Without an identity the attempt is `Unauthenticated`
    /// and the ledger is not consulted.
    ///
    /// # Errors
    ///
    /// See [`try_deduct`](CreditLedger::try_deduct).
    async fn authorize_and_deduct(&self, identity: Option<UserId>, cost: i64) -> GateOutcome {
        let Some(user_id) = identity else {
            tracing::debug!("generation attempt without identity");
            return Err(GateError::Unauthenticated.into());
        };
        if cost <= 0 {
            return Err(GateError::Ledger(LedgerError::InvalidAmount { amount: cost }).into());
        }

        let deduction = self.try_deduct(user_id, cost).await?;
        tracing::info!(
            user_id = %user_id,
            charged = deduction.charged,
            remaining = deduction.remaining,
            "credits deducted"
        );
        Ok(deduction)
    }
}
