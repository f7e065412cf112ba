//! Storage for short-lived authorization state and browser sessions.
//!
//! Both traits must be backed by a store shared across every gateway
//! instance in a horizontally scaled deployment. [`MemoryStore`] is only
//! suitable when a single instance is guaranteed.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// A login that has been started but not yet redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// Correlation value sent to the IdP, also the store key
    pub state: String,
    /// PKCE verifier whose challenge was sent along with `state`
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(state: impl Into<String>, code_verifier: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            code_verifier: code_verifier.into(),
            created_at: Utc::now(),
        }
    }
}

/// An authenticated browser session. The browser only ever sees `handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub handle: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Registry of `state -> code_verifier` pairs awaiting their callback.
#[async_trait]
pub trait PendingAuthorizationStore: Send + Sync {
    /// Register a pending authorization under its state for at most `ttl`.
    async fn put(&self, pending: PendingAuthorization, ttl: Duration) -> Result<()>;

    /// Atomically remove and return the entry for `state`.
    ///
    /// Unknown, expired and already-taken states all yield `None`. When
    /// several callers race on the same state at most one gets `Some`.
    async fn take(&self, state: &str) -> Result<Option<PendingAuthorization>>;
}

/// Storage behind [`crate::session::SessionTokenCache`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a session, replacing any previous one with the same handle.
    async fn put_session(&self, session: Session, ttl: Duration) -> Result<()>;

    async fn get_session(&self, handle: &str) -> Result<Option<Session>>;

    async fn delete_session(&self, handle: &str) -> Result<()>;
}

/// `now + ttl`, saturating instead of overflowing.
pub(crate) fn expires_after(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
