//! PostgreSQL session repository.

use super::{SessionError, SessionStore};
use async_trait::async_trait;
use kelasi_core::UserId;
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for session lookups.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
}

impl SessionRow {
    fn try_into_user_id(self) -> Result<UserId, SessionError> {
        UserId::from_str(&self.user_id).map_err(|e| SessionError::CorruptSession {
            session_id: self.id,
            reason: e.to_string(),
        })
    }
}

fn database_error(e: sqlx::Error) -> SessionError {
    SessionError::DatabaseError {
        details: e.to_string(),
    }
}

/// Sessions stored in the `sessions` table.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new session store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_user(&self, session_id: &str) -> Result<Option<UserId>, Report<SessionError>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id
            FROM sessions
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(row.try_into_user_id()?)),
            None => Ok(None),
        }
    }

    async fn delete_expired(&self) -> Result<u64, Report<SessionError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected())
    }
}
