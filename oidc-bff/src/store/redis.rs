use super::{PendingAuthorization, PendingAuthorizationStore, Session, SessionStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

const PENDING_PREFIX: &str = "pending:";
const SESSION_PREFIX: &str = "session:";

/// Redis-backed store shared by every gateway instance.
///
/// Values are JSON. Expiry is delegated to Redis (`SET .. EX`) and `take`
/// uses `GETDEL`, so a state can be redeemed once across the whole fleet.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(storage)?;
        let conn = ConnectionManager::new(client).await.map_err(storage)?;
        Ok(Self {
            conn,
            prefix: "bff:".to_string(),
        })
    }

    /// Namespace every key, e.g. when several gateways share one Redis.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, kind: &str, id: &str) -> String {
        format!("{}{}{}", self.prefix, kind, id)
    }

    async fn set_json<T: serde::Serialize>(&self, key: String, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value).map_err(|e| Error::Internal(e.to_string()))?;
        // EX 0 is rejected by Redis
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, json, seconds)
            .await
            .map_err(storage)
    }
}

fn storage(e: redis::RedisError) -> Error {
    Error::Storage(e.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|json| serde_json::from_str(&json).map_err(|e| Error::Storage(e.to_string())))
        .transpose()
}

#[async_trait]
impl PendingAuthorizationStore for RedisStore {
    async fn put(&self, pending: PendingAuthorization, ttl: Duration) -> Result<()> {
        let key = self.key(PENDING_PREFIX, &pending.state);
        self.set_json(key, &pending, ttl).await
    }

    async fn take(&self, state: &str) -> Result<Option<PendingAuthorization>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(self.key(PENDING_PREFIX, state))
            .query_async(&mut conn)
            .await
            .map_err(storage)?;
        decode(raw)
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put_session(&self, session: Session, ttl: Duration) -> Result<()> {
        let key = self.key(SESSION_PREFIX, &session.handle);
        self.set_json(key, &session, ttl).await
    }

    async fn get_session(&self, handle: &str) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.key(SESSION_PREFIX, handle))
            .await
            .map_err(storage)?;
        Ok(decode::<Session>(raw)?.filter(|session| !session.is_expired()))
    }

    async fn delete_session(&self, handle: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(SESSION_PREFIX, handle))
            .await
            .map_err(storage)
    }
}
