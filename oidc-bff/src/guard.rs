//! Admission checks evaluated before a route's interceptor and proxy run.

use crate::context::RequestContext;
use crate::error::{Error, Result, reason};
use crate::route::CredentialSource;
use crate::secret::{AuthorizationSecrets, CODE_CHALLENGE_METHOD};
use crate::session::SessionTokenCache;
use crate::store::{PendingAuthorization, PendingAuthorizationStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Either admits (`Ok(true)`), refuses (`Ok(false)`) or fails with a
/// client-facing error. Guards may add parameters for later stages.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn can_activate(&self, ctx: &mut RequestContext) -> Result<bool>;
}

pub struct NoOpGuard;

#[async_trait]
impl Guard for NoOpGuard {
    async fn can_activate(&self, _ctx: &mut RequestContext) -> Result<bool> {
        Ok(true)
    }
}

/// Compares the `state` query parameter with the state cookie.
pub struct StateGuard {
    cookie_name: String,
}

impl StateGuard {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

#[async_trait]
impl Guard for StateGuard {
    async fn can_activate(&self, ctx: &mut RequestContext) -> Result<bool> {
        let (Some(param), Some(cookie)) =
            (ctx.query_param("state"), ctx.cookie(&self.cookie_name))
        else {
            tracing::warn!("state check failed: state missing");
            return Err(Error::unauthorized(reason::STATE_NOT_FOUND));
        };

        if param != cookie {
            tracing::warn!("state check failed: mismatch");
            return Err(Error::unauthorized(reason::STATE_INVALID));
        }
        Ok(true)
    }
}

/// State plus server-held PKCE verifier.
///
/// Without a `code` parameter this is the authorization leg: a fresh state and
/// verifier are registered and the challenge parameters injected. With a
/// `code` it is the token leg: the state is redeemed exactly once and its
/// verifier injected as `code_verifier`.
pub struct StatePkceGuard {
    pending: Arc<dyn PendingAuthorizationStore>,
    ttl: Duration,
}

impl StatePkceGuard {
    pub fn new(pending: Arc<dyn PendingAuthorizationStore>, ttl: Duration) -> Self {
        Self { pending, ttl }
    }
}

#[async_trait]
impl Guard for StatePkceGuard {
    async fn can_activate(&self, ctx: &mut RequestContext) -> Result<bool> {
        if request_value(ctx, "code").is_none() {
            let secrets = AuthorizationSecrets::generate();
            self.pending
                .put(
                    PendingAuthorization::new(&secrets.state, &secrets.code_verifier),
                    self.ttl,
                )
                .await?;
            ctx.insert_param("state", secrets.state);
            ctx.insert_param("code_challenge", secrets.code_challenge);
            ctx.insert_param("code_challenge_method", CODE_CHALLENGE_METHOD);
            return Ok(true);
        }

        let Some(state) = request_value(ctx, "state") else {
            tracing::warn!("token request without state");
            return Err(Error::unauthorized(reason::STATE_NOT_FOUND));
        };

        match self.pending.take(&state).await? {
            Some(pending) => {
                ctx.insert_param("code_verifier", pending.code_verifier);
                Ok(true)
            }
            None => {
                tracing::warn!("token request with unknown, expired or redeemed state");
                Err(Error::unauthorized(reason::STATE_INVALID))
            }
        }
    }
}

/// Query parameter first, then the request's data source.
fn request_value(ctx: &RequestContext, key: &str) -> Option<String> {
    ctx.query_param(key)
        .map(str::to_string)
        .or_else(|| ctx.param(key).and_then(Value::as_str).map(str::to_string))
        .filter(|v| !v.is_empty())
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
}

/// RFC 7662 token introspection. Fails closed: anything but a successful
/// `{"active": true}` answer is a rejection.
pub struct IntrospectionGuard {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
    source: CredentialSource,
    sessions: SessionTokenCache,
    session_cookie: String,
}

impl IntrospectionGuard {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        sessions: SessionTokenCache,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            source: CredentialSource::default(),
            sessions,
            session_cookie: session_cookie.into(),
        }
    }

    pub fn with_source(mut self, source: CredentialSource) -> Self {
        self.source = source;
        self
    }

    async fn token(&self, ctx: &RequestContext) -> Result<Option<String>> {
        match self.source {
            CredentialSource::BearerHeader => Ok(ctx
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(extract_bearer_token)
                .map(str::to_string)),
            CredentialSource::SessionCookie => match ctx.cookie(&self.session_cookie) {
                Some(handle) => self.sessions.lookup(handle).await,
                None => Ok(None),
            },
        }
    }

    async fn introspect(&self, token: &str) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "introspection call failed");
                Error::unauthorized(reason::INTROSPECTION_FAILED)
            })?;

        if !response.status().is_success() {
            tracing::warn!(status = response.status().as_u16(), "introspection endpoint refused");
            return Err(Error::unauthorized(reason::INTROSPECTION_FAILED));
        }

        let body: IntrospectionResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "unreadable introspection response");
            Error::unauthorized(reason::INTROSPECTION_FAILED)
        })?;

        Ok(body.active)
    }
}

#[async_trait]
impl Guard for IntrospectionGuard {
    async fn can_activate(&self, ctx: &mut RequestContext) -> Result<bool> {
        let Some(token) = self.token(ctx).await? else {
            tracing::warn!("no access token for introspection");
            return Err(Error::unauthorized(reason::ACCESS_TOKEN_NOT_FOUND));
        };

        if !self.introspect(&token).await? {
            tracing::warn!("inactive access token");
            return Err(Error::unauthorized(reason::TOKEN_NOT_ACTIVE));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::code_challenge;
    use crate::store::MemoryStore;
    use http::{HeaderValue, Method};
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TTL: Duration = Duration::from_secs(300);

    fn unauthorized_message(err: Error) -> String {
        match err {
            Error::Unauthorized(message) => message,
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn noop_admits() {
        let mut ctx = RequestContext::new(Method::GET);
        assert!(NoOpGuard.can_activate(&mut ctx).await.unwrap());
    }

    #[tokio::test]
    async fn state_guard_matches_query_against_cookie() {
        let guard = StateGuard::new("STATE");

        let mut ok = RequestContext::new(Method::GET)
            .with_query("state", "s1")
            .with_cookie("STATE", "s1");
        assert!(guard.can_activate(&mut ok).await.unwrap());

        let mut mismatch = RequestContext::new(Method::GET)
            .with_query("state", "s1")
            .with_cookie("STATE", "s2");
        let err = guard.can_activate(&mut mismatch).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "State was invalid.");

        let mut no_cookie = RequestContext::new(Method::GET).with_query("state", "s1");
        let err = guard.can_activate(&mut no_cookie).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "State was NOT found.");

        let mut no_query = RequestContext::new(Method::GET).with_cookie("STATE", "s1");
        let err = guard.can_activate(&mut no_query).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "State was NOT found.");
    }

    #[tokio::test]
    async fn state_pkce_round_trip_redeems_once() {
        let store = Arc::new(MemoryStore::new());
        let guard = StatePkceGuard::new(store.clone(), TTL);

        let mut authorize = RequestContext::new(Method::GET);
        assert!(guard.can_activate(&mut authorize).await.unwrap());
        let state = authorize.query_param("state").unwrap().to_string();
        let challenge = authorize.query_param("code_challenge").unwrap().to_string();
        assert_eq!(authorize.query_param("code_challenge_method"), Some("S256"));

        let mut token = RequestContext::new(Method::POST)
            .with_query("state", state.as_str())
            .with_body("code", "c1");
        assert!(guard.can_activate(&mut token).await.unwrap());
        let verifier = token.param("code_verifier").and_then(Value::as_str).unwrap();
        assert_eq!(code_challenge(verifier), challenge);

        let mut replay = RequestContext::new(Method::POST)
            .with_query("state", state.as_str())
            .with_body("code", "c1");
        let err = guard.can_activate(&mut replay).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "State was invalid.");
    }

    #[tokio::test]
    async fn state_pkce_token_leg_requires_state() {
        let guard = StatePkceGuard::new(Arc::new(MemoryStore::new()), TTL);
        let mut ctx = RequestContext::new(Method::POST).with_body("code", "c1");
        let err = guard.can_activate(&mut ctx).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "State was NOT found.");
    }

    fn introspection_guard(
        server: &MockServer,
        source: CredentialSource,
    ) -> (IntrospectionGuard, SessionTokenCache) {
        let sessions = SessionTokenCache::new(Arc::new(MemoryStore::new()));
        let guard = IntrospectionGuard::new(
            reqwest::Client::new(),
            format!("{}/introspect", server.uri()),
            "bff",
            "secret",
            sessions.clone(),
            "BFF_OIDC_SESSION",
        )
        .with_source(source);
        (guard, sessions)
    }

    #[tokio::test]
    async fn introspection_admits_active_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(header("authorization", "Basic YmZmOnNlY3JldA=="))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("token=tok&token_type_hint=access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (guard, sessions) = introspection_guard(&server, CredentialSource::SessionCookie);
        let handle = sessions.create("tok", TTL).await.unwrap();

        let mut ctx = RequestContext::new(Method::GET).with_cookie("BFF_OIDC_SESSION", &handle);
        assert!(guard.can_activate(&mut ctx).await.unwrap());
    }

    #[tokio::test]
    async fn introspection_rejects_inactive_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": false})))
            .mount(&server)
            .await;

        let (guard, _) = introspection_guard(&server, CredentialSource::BearerHeader);
        let mut ctx = RequestContext::new(Method::GET).with_header(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok"),
        );
        let err = guard.can_activate(&mut ctx).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "Token was NOT active.");
    }

    #[tokio::test]
    async fn introspection_fails_closed_on_transport_error() {
        let sessions = SessionTokenCache::new(Arc::new(MemoryStore::new()));
        let guard = IntrospectionGuard::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/introspect",
            "bff",
            "secret",
            sessions,
            "BFF_OIDC_SESSION",
        )
        .with_source(CredentialSource::BearerHeader);

        let mut ctx = RequestContext::new(Method::GET).with_header(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok"),
        );
        let err = guard.can_activate(&mut ctx).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "Token introspection failed.");
    }

    #[tokio::test]
    async fn introspection_fails_closed_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (guard, _) = introspection_guard(&server, CredentialSource::BearerHeader);
        let mut ctx = RequestContext::new(Method::GET).with_header(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok"),
        );
        assert!(matches!(
            guard.can_activate(&mut ctx).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn introspection_without_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": true})))
            .expect(0)
            .mount(&server)
            .await;

        let (guard, _) = introspection_guard(&server, CredentialSource::SessionCookie);

        let mut no_cookie = RequestContext::new(Method::GET);
        let err = guard.can_activate(&mut no_cookie).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "Access token was NOT found.");

        let mut unknown = RequestContext::new(Method::GET).with_cookie("BFF_OIDC_SESSION", "forged");
        let err = guard.can_activate(&mut unknown).await.unwrap_err();
        assert_eq!(unauthorized_message(err), "Access token was NOT found.");
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}
