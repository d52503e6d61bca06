//! PostgreSQL-backed credit ledger.

use crate::error::{GateError, LedgerError};
use crate::ledger::{CreditLedger, Deduction, GateOutcome};
use async_trait::async_trait;
use kelasi_core::UserId;
use rootcause::prelude::Report;
use sqlx::PgPool;
use tracing::instrument;

/// Credit ledger over the `credit_accounts` table.
///
/// Deduction is a single conditional `UPDATE ... RETURNING`, so the database
/// row lock serialises concurrent attempts on the same account and the
/// balance can never go negative.
#[derive(Debug, Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    /// Creates a ledger over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_balance(&self, user_id: UserId) -> Result<Option<i64>, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT credits
            FROM credit_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|(credits,)| credits))
    }
}

fn storage_error(e: sqlx::Error) -> LedgerError {
    tracing::error!(error = %e, "credit ledger query failed");
    LedgerError::Storage {
        details: e.to_string(),
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn try_deduct(&self, user_id: UserId, cost: i64) -> GateOutcome {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE credit_accounts
            SET credits = credits - $2, updated_at = NOW()
            WHERE user_id = $1 AND credits >= $2
            RETURNING credits
            "#,
        )
        .bind(user_id.to_string())
        .bind(cost)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GateError::Ledger(storage_error(e)))?;

        if let Some((remaining,)) = row {
            return Ok(Deduction {
                user_id,
                charged: cost,
                remaining,
            });
        }

        // Nothing was updated: either there is no account or it cannot pay.
        match self
            .current_balance(user_id)
            .await
            .map_err(GateError::Ledger)?
        {
            None => Err(GateError::Unauthenticated.into()),
            Some(balance) => Err(GateError::InsufficientCredits {
                user_id,
                balance,
                cost,
            }
            .into()),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn balance(&self, user_id: UserId) -> Result<i64, Report<LedgerError>> {
        Ok(self
            .current_balance(user_id)
            .await?
            .ok_or(LedgerError::AccountNotFound { user_id })?)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn open_account(
        &self,
        user_id: UserId,
        initial: i64,
    ) -> Result<i64, Report<LedgerError>> {
        if initial < 0 {
            return Err(LedgerError::InvalidAmount { amount: initial }.into());
        }

        sqlx::query(
            r#"
            INSERT INTO credit_accounts (user_id, credits, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.to_string())
        .bind(initial)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        self.balance(user_id).await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn grant(&self, user_id: UserId, amount: i64) -> Result<i64, Report<LedgerError>> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount }.into());
        }

        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE credit_accounts
            SET credits = credits + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING credits
            "#,
        )
        .bind(user_id.to_string())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let (balance,) = row.ok_or(LedgerError::AccountNotFound { user_id })?;
        tracing::info!(amount, balance, "credits granted");
        Ok(balance)
    }
}
