//! Process-local credit ledger.

use crate::error::{GateError, LedgerError};
use crate::ledger::{CreditLedger, Deduction, GateOutcome};
use async_trait::async_trait;
use kelasi_core::UserId;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A credit ledger held in memory.
///
/// Every operation runs inside one critical section, which makes
/// check-and-decrement atomic. Clones share the same balances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    accounts: Arc<Mutex<HashMap<UserId, i64>>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger pre-loaded with balances.
    #[must_use]
    pub fn with_accounts(accounts: impl IntoIterator<Item = (UserId, i64)>) -> Self {
        Self {
            accounts: Arc::new(Mutex::new(accounts.into_iter().collect())),
        }
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn try_deduct(&self, user_id: UserId, cost: i64) -> GateOutcome {
        let mut accounts = self.accounts.lock().await;
        let balance = accounts
            .get_mut(&user_id)
            .ok_or(GateError::Unauthenticated)?;

        if *balance < cost {
            return Err(GateError::InsufficientCredits {
                user_id,
                balance: *balance,
                cost,
            }
            .into());
        }

        *balance -= cost;
        Ok(Deduction {
            user_id,
            charged: cost,
            remaining: *balance,
        })
    }

    async fn balance(&self, user_id: UserId) -> Result<i64, Report<LedgerError>> {
        let accounts = self.accounts.lock().await;
        Ok(*accounts
            .get(&user_id)
            .ok_or(LedgerError::AccountNotFound { user_id })?)
    }

    async fn open_account(
        &self,
        user_id: UserId,
        initial: i64,
    ) -> Result<i64, Report<LedgerError>> {
        if initial < 0 {
            return Err(LedgerError::InvalidAmount { amount: initial }.into());
        }
        let mut accounts = self.accounts.lock().await;
        Ok(*accounts.entry(user_id).or_insert(initial))
    }

    async fn grant(&self, user_id: UserId, amount: i64) -> Result<i64, Report<LedgerError>> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount }.into());
        }
        let mut accounts = self.accounts.lock().await;
        let balance = accounts
            .get_mut(&user_id)
            .ok_or(LedgerError::AccountNotFound { user_id })?;
        *balance += amount;
        Ok(*balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deducts_when_balance_covers_cost() {
        let user = UserId::new();
        let ledger = InMemoryLedger::with_accounts([(user, 3)]);

        let deduction = ledger
            .authorize_and_deduct(Some(user), 1)
            .await
            .expect("should deduct");
        assert_eq!(deduction.remaining, 2);
        assert_eq!(ledger.balance(user).await.expect("balance"), 2);
    }

    #[tokio::test]
    async fn missing_identity_is_unauthenticated() {
        let ledger = InMemoryLedger::new();
        let err = ledger.authorize_and_deduct(None, 1).await.unwrap_err();
        assert_eq!(err.current_context(), &GateError::Unauthenticated);
    }

    #[tokio::test]
    async fn unknown_account_is_unauthenticated() {
        let ledger = InMemoryLedger::new();
        let err = ledger
            .authorize_and_deduct(Some(UserId::new()), 1)
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &GateError::Unauthenticated);
    }

    #[tokio::test]
    async fn empty_balance_is_refused_without_deduction() {
        let user = UserId::new();
        let ledger = InMemoryLedger::with_accounts([(user, 0)]);

        let err = ledger
            .authorize_and_deduct(Some(user), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            GateError::InsufficientCredits { balance: 0, .. }
        ));
        assert_eq!(ledger.balance(user).await.expect("balance"), 0);
    }

    #[tokio::test]
    async fn non_positive_cost_is_rejected() {
        let user = UserId::new();
        let ledger = InMemoryLedger::with_accounts([(user, 5)]);
        let err = ledger.authorize_and_deduct(Some(user), 0).await.unwrap_err();
        assert!(matches!(err.current_context(), GateError::Ledger(_)));
        assert_eq!(ledger.balance(user).await.expect("balance"), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_credit_is_spent_once_under_concurrency() {
        let user = UserId::new();
        let ledger = InMemoryLedger::with_accounts([(user, 1)]);

        let attempts = (0..8).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.authorize_and_deduct(Some(user), 1).await })
        });
        let results = futures::future::join_all(attempts).await;

        let (won, lost): (Vec<_>, Vec<_>) = results
            .into_iter()
            .map(|r| r.expect("task completes"))
            .partition(Result::is_ok);
        assert_eq!(won.len(), 1);
        assert_eq!(lost.len(), 7);
        for outcome in lost {
            let err = outcome.unwrap_err();
            assert!(matches!(
                err.current_context(),
                GateError::InsufficientCredits { .. }
            ));
        }
        assert_eq!(ledger.balance(user).await.expect("balance"), 0);
    }

    #[tokio::test]
    async fn open_account_is_idempotent() {
        let user = UserId::new();
        let ledger = InMemoryLedger::new();

        assert_eq!(ledger.open_account(user, 3).await.expect("open"), 3);
        ledger.authorize_and_deduct(Some(user), 1).await.expect("deduct");
        assert_eq!(ledger.open_account(user, 3).await.expect("reopen"), 2);
    }

    #[tokio::test]
    async fn grant_requires_existing_account() {
        let ledger = InMemoryLedger::new();
        let user = UserId::new();
        let err = ledger.grant(user, 1).await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &LedgerError::AccountNotFound { user_id: user }
        );

        ledger.open_account(user, 0).await.expect("open");
        assert_eq!(ledger.grant(user, 2).await.expect("grant"), 2);
    }
}
