use super::{PendingAuthorization, PendingAuthorizationStore, Session, SessionStore, expires_after};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process store for single-instance deployments and tests.
///
/// Entries expire lazily: reads skip anything past its deadline and
/// [`MemoryStore::purge_expired`] drops them for good.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pending: Arc<RwLock<HashMap<String, Expiring<PendingAuthorization>>>>,
    sessions: Arc<RwLock<HashMap<String, Expiring<Session>>>>,
}

#[derive(Clone)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: expires_after(ttl),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, entry| entry.is_live(now));
        removed += before - pending.len();
        drop(pending);

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_live(now));
        removed += before - sessions.len();

        removed
    }
}

#[async_trait]
impl PendingAuthorizationStore for MemoryStore {
    async fn put(&self, pending: PendingAuthorization, ttl: Duration) -> Result<()> {
        self.pending
            .write()
            .await
            .insert(pending.state.clone(), Expiring::new(pending, ttl));
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<PendingAuthorization>> {
        // Removal happens under the write lock, so only one caller can win.
        let entry = self.pending.write().await.remove(state);
        Ok(entry
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| entry.value))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put_session(&self, session: Session, ttl: Duration) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.handle.clone(), Expiring::new(session, ttl));
        Ok(())
    }

    async fn get_session(&self, handle: &str) -> Result<Option<Session>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(handle)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete_session(&self, handle: &str) -> Result<()> {
        self.sessions.write().await.remove(handle);
        Ok(())
    }
}
