use crate::cookies::CookieNames;
use crate::session::HandleStrategy;
use std::fmt;
use std::time::Duration;

/// Configuration for the gateway
#[derive(Clone)]
pub struct GatewayConfig {
    pub cookie_names: CookieNames,

    /// Lifetime of the STATE / NONCE / CODE_VERIFIER cookies
    pub authorization_cookie_max_age: Duration,

    /// How long a started login may wait for its callback
    pub pending_ttl: Duration,

    /// Session cookie and cached access token lifetime
    pub session_ttl: Duration,

    /// Basic credentials presented to the introspection endpoint
    pub client_id: String,
    pub client_secret: String,

    /// Upper bound on every call to the IdP or a downstream API
    pub outbound_timeout: Duration,

    pub handle_strategy: HandleStrategy,

    /// Largest inbound body the gateway will buffer
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cookie_names: CookieNames::default(),
            authorization_cookie_max_age: Duration::from_secs(300),
            pending_ttl: Duration::from_secs(300),
            session_ttl: Duration::from_secs(3600),
            client_id: String::new(),
            client_secret: String::new(),
            outbound_timeout: Duration::from_secs(10),
            handle_strategy: HandleStrategy::Random,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl GatewayConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_cookie_names(mut self, names: CookieNames) -> Self {
        self.cookie_names = names;
        self
    }

    pub fn with_authorization_cookie_max_age(mut self, max_age: Duration) -> Self {
        self.authorization_cookie_max_age = max_age;
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_outbound_timeout(mut self, timeout: Duration) -> Self {
        self.outbound_timeout = timeout;
        self
    }

    pub fn with_handle_strategy(mut self, strategy: HandleStrategy) -> Self {
        self.handle_strategy = strategy;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("cookie_names", &self.cookie_names)
            .field("authorization_cookie_max_age", &self.authorization_cookie_max_age)
            .field("pending_ttl", &self.pending_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("outbound_timeout", &self.outbound_timeout)
            .field("handle_strategy", &self.handle_strategy)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_client_secret() {
        let config = GatewayConfig::new("bff", "s3cr3t");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("bff"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.cookie_names.session, "BFF_OIDC_SESSION");
        assert_eq!(config.pending_ttl, Duration::from_secs(300));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.handle_strategy, HandleStrategy::Random);
    }
}
