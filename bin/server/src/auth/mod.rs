//! Authentication for the kelasi server.
//!
//! Sessions are issued by the sign-in service and stored in the `sessions`
//! table. This server only resolves a presented session to a [`UserId`] and
//! purges expired rows; it never creates sessions itself.
//!
//! A session is presented either as the `session` cookie or as an
//! `Authorization: Bearer <session id>` header.

pub mod db;
pub mod middleware;

use async_trait::async_trait;
use kelasi_core::UserId;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use db::PgSessionStore;
pub use middleware::{AuthRejection, OptionalAuth, RequireAuth};

/// Session store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The backing store failed.
    DatabaseError { details: String },
    /// A stored session refers to a malformed user id.
    CorruptSession { session_id: String, reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatabaseError { details } => write!(f, "session database error: {details}"),
            Self::CorruptSession { session_id, reason } => {
                write!(f, "session '{session_id}' is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Resolves session identifiers to users.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the user owning an unexpired session, or `None`.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the store cannot be read.
    async fn find_user(&self, session_id: &str) -> Result<Option<UserId>, Report<SessionError>>;

    /// Deletes expired sessions, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the store cannot be written.
    async fn delete_expired(&self) -> Result<u64, Report<SessionError>>;
}

/// A session store held in memory, for tests and local development.
///
/// Sessions never expire.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, UserId>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session for a user.
    pub async fn insert(&self, session_id: impl Into<String>, user_id: UserId) {
        self.sessions
            .write()
            .await
            .insert(session_id.into(), user_id);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_user(&self, session_id: &str) -> Result<Option<UserId>, Report<SessionError>> {
        Ok(self.sessions.read().await.get(session_id).copied())
    }

    async fn delete_expired(&self) -> Result<u64, Report<SessionError>> {
        Ok(0)
    }
}

/// Deletes expired sessions and logs the outcome.
pub async fn cleanup_expired(store: &dyn SessionStore, trigger: &'static str) {
    match store.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(deleted_sessions = count, trigger, "cleaned up expired sessions");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, trigger, "failed to clean up expired sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_resolves_registered_sessions() {
        let store = InMemorySessionStore::new();
        let user = UserId::new();
        store.insert("sess-1", user).await;

        assert_eq!(store.find_user("sess-1").await.expect("reads"), Some(user));
        assert_eq!(store.find_user("sess-2").await.expect("reads"), None);
        assert_eq!(store.delete_expired().await.expect("deletes"), 0);
    }

    struct ExpiringStore {
        purges: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for ExpiringStore {
        async fn find_user(&self, _: &str) -> Result<Option<UserId>, Report<SessionError>> {
            Ok(None)
        }

        async fn delete_expired(&self) -> Result<u64, Report<SessionError>> {
            self.purges
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(Report::new(SessionError::DatabaseError {
                details: "connection reset".to_string(),
            }))
        }
    }

    #[tokio::test]
    async fn cleanup_purges_without_failing_the_caller() {
        let store = ExpiringStore {
            purges: std::sync::atomic::AtomicUsize::new(0),
        };

        cleanup_expired(&store, "startup").await;
        cleanup_expired(&store, "periodic").await;

        assert_eq!(store.purges.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
