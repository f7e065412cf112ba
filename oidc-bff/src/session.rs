//! Opaque browser session handles mapped to upstream access tokens.

use crate::error::Result;
use crate::secret::sha256_hex;
use crate::store::{Session, SessionStore, expires_after};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

/// How a new session handle is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandleStrategy {
    /// Independent random handle per login. Two logins with the same token
    /// get two sessions, and each can be revoked on its own.
    #[default]
    Random,
    /// Hex SHA-256 of the access token. Repeated logins with the same token
    /// collapse onto a single handle.
    TokenDigest,
}

impl HandleStrategy {
    fn handle_for(self, access_token: &str) -> String {
        match self {
            HandleStrategy::Random => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                hex::encode(bytes)
            }
            HandleStrategy::TokenDigest => sha256_hex(access_token),
        }
    }
}

#[derive(Clone)]
pub struct SessionTokenCache {
    store: Arc<dyn SessionStore>,
    strategy: HandleStrategy,
}

impl SessionTokenCache {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_strategy(store, HandleStrategy::default())
    }

    pub fn with_strategy(store: Arc<dyn SessionStore>, strategy: HandleStrategy) -> Self {
        Self { store, strategy }
    }

    /// Store `access_token` for `ttl` and return the handle the browser gets.
    pub async fn create(&self, access_token: &str, ttl: Duration) -> Result<String> {
        let handle = self.strategy.handle_for(access_token);
        let session = Session {
            handle: handle.clone(),
            access_token: access_token.to_string(),
            expires_at: expires_after(ttl),
        };
        self.store.put_session(session, ttl).await?;
        Ok(handle)
    }

    /// The access token behind `handle`, if the session is still live.
    pub async fn lookup(&self, handle: &str) -> Result<Option<String>> {
        if handle.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .get_session(handle)
            .await?
            .filter(|session| !session.is_expired())
            .map(|session| session.access_token))
    }

    pub async fn revoke(&self, handle: &str) -> Result<()> {
        self.store.delete_session(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn random_handles_are_independent() {
        let cache = SessionTokenCache::new(Arc::new(MemoryStore::new()));

        let a = cache.create("tok", HOUR).await.unwrap();
        let b = cache.create("tok", HOUR).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);

        cache.revoke(&a).await.unwrap();
        assert!(cache.lookup(&a).await.unwrap().is_none());
        assert_eq!(cache.lookup(&b).await.unwrap().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn digest_handles_are_deterministic() {
        let cache =
            SessionTokenCache::with_strategy(Arc::new(MemoryStore::new()), HandleStrategy::TokenDigest);

        let a = cache.create("tok", HOUR).await.unwrap();
        let b = cache.create("tok", HOUR).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex("tok"));
    }

    #[tokio::test]
    async fn unknown_or_empty_handle_is_none() {
        let cache = SessionTokenCache::new(Arc::new(MemoryStore::new()));
        assert!(cache.lookup("missing").await.unwrap().is_none());
        assert!(cache.lookup("").await.unwrap().is_none());
    }
}
