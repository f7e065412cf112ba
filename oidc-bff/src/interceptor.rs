//! Stages wrapped around the proxied call: `before` shapes the outbound
//! request, `after` rewrites the upstream response.

use crate::context::RequestContext;
use crate::cookies::CookieNames;
use crate::error::{Error, Result, reason};
use crate::proxy::ProxyResponse;
use crate::secret::{AuthorizationSecrets, CODE_CHALLENGE_METHOD};
use crate::session::SessionTokenCache;
use crate::store::{PendingAuthorization, PendingAuthorizationStore};
use crate::token::decode_id_token_claims;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn before(&self, _ctx: &mut RequestContext) -> Result<()> {
        Ok(())
    }

    async fn after(&self, _ctx: &mut RequestContext, response: ProxyResponse) -> Result<ProxyResponse> {
        Ok(response)
    }
}

pub struct NoOpInterceptor;

impl Interceptor for NoOpInterceptor {}

/// Starts a login: issues state, nonce and PKCE values, remembers the
/// verifier server-side and hands the browser short-lived cookies.
///
/// The code-verifier cookie carries the state, which is the key of the
/// pending entry. The verifier itself never leaves the server.
pub struct AuthRequestInterceptor {
    pending: Arc<dyn PendingAuthorizationStore>,
    cookie_names: CookieNames,
    pending_ttl: Duration,
    cookie_max_age: Duration,
}

impl AuthRequestInterceptor {
    pub fn new(
        pending: Arc<dyn PendingAuthorizationStore>,
        cookie_names: CookieNames,
        pending_ttl: Duration,
        cookie_max_age: Duration,
    ) -> Self {
        Self {
            pending,
            cookie_names,
            pending_ttl,
            cookie_max_age,
        }
    }
}

#[async_trait]
impl Interceptor for AuthRequestInterceptor {
    async fn before(&self, ctx: &mut RequestContext) -> Result<()> {
        let secrets = AuthorizationSecrets::generate();

        self.pending
            .put(
                PendingAuthorization::new(&secrets.state, &secrets.code_verifier),
                self.pending_ttl,
            )
            .await?;

        ctx.insert_param("state", secrets.state.as_str());
        ctx.insert_param("nonce", secrets.nonce.as_str());
        ctx.insert_param("code_challenge", secrets.code_challenge.as_str());
        ctx.insert_param("code_challenge_method", CODE_CHALLENGE_METHOD);

        let secure = ctx.is_secure();
        let max_age = self.cookie_max_age;
        let names = &self.cookie_names;
        let jar = ctx.cookies_mut();
        jar.set(&names.state, &secrets.state, max_age, secure);
        jar.set(&names.nonce, &secrets.nonce, max_age, secure);
        jar.set(&names.code_verifier, &secrets.state, max_age, secure);

        tracing::info!("authorization request started");
        Ok(())
    }
}

/// Finishes a login: redeems the pending verifier, checks the ID token nonce
/// and swaps the IdP's tokens for an opaque session cookie.
pub struct TokenExchangeInterceptor {
    pending: Arc<dyn PendingAuthorizationStore>,
    sessions: SessionTokenCache,
    cookie_names: CookieNames,
    session_ttl: Duration,
}

impl TokenExchangeInterceptor {
    pub fn new(
        pending: Arc<dyn PendingAuthorizationStore>,
        sessions: SessionTokenCache,
        cookie_names: CookieNames,
        session_ttl: Duration,
    ) -> Self {
        Self {
            pending,
            sessions,
            cookie_names,
            session_ttl,
        }
    }
}

#[async_trait]
impl Interceptor for TokenExchangeInterceptor {
    async fn before(&self, ctx: &mut RequestContext) -> Result<()> {
        let names = &self.cookie_names;

        if ctx.cookie(&names.nonce).is_none_or(str::is_empty) {
            tracing::warn!("token exchange without nonce cookie");
            return Err(Error::unauthorized(reason::NONCE_NOT_FOUND));
        }
        let Some(pending_key) = ctx
            .cookie(&names.code_verifier)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
        else {
            tracing::warn!("token exchange without code verifier cookie");
            return Err(Error::unauthorized(reason::PKCE_INVALID));
        };

        // Single use, whatever happens next.
        let secure = ctx.is_secure();
        let jar = ctx.cookies_mut();
        jar.expire(&names.state, secure);
        jar.expire(&names.nonce, secure);
        jar.expire(&names.code_verifier, secure);

        let Some(pending) = self.pending.take(&pending_key).await? else {
            tracing::warn!("token exchange with unknown, expired or redeemed authorization");
            return Err(Error::unauthorized(reason::STATE_INVALID));
        };

        ctx.insert_param("code_verifier", pending.code_verifier);
        Ok(())
    }

    async fn after(&self, ctx: &mut RequestContext, mut response: ProxyResponse) -> Result<ProxyResponse> {
        let body = response.json().unwrap_or(Value::Null);

        let Some(id_token) = body.get("id_token").and_then(Value::as_str) else {
            tracing::warn!(status = response.status.as_u16(), "token response without id_token");
            return Err(Error::unauthorized(reason::ID_TOKEN_NOT_FOUND));
        };

        let claims = decode_id_token_claims(id_token).map_err(|e| {
            tracing::warn!(error = %e, "undecodable id_token");
            Error::unauthorized(reason::NONCE_NOT_FOUND)
        })?;
        let Some(nonce) = claims.nonce else {
            return Err(Error::unauthorized(reason::NONCE_NOT_FOUND));
        };
        if ctx.cookie(&self.cookie_names.nonce) != Some(nonce.as_str()) {
            tracing::warn!("id_token nonce mismatch");
            return Err(Error::unauthorized(reason::NONCE_INVALID));
        }

        let Some(access_token) = body.get("access_token").and_then(Value::as_str) else {
            return Err(Error::unauthorized(reason::ACCESS_TOKEN_NOT_FOUND));
        };

        let handle = self.sessions.create(access_token, self.session_ttl).await?;
        let secure = ctx.is_secure();
        ctx.cookies_mut()
            .set(&self.cookie_names.session, &handle, self.session_ttl, secure);

        response.replace_json(&json!({ "authorization": "succeeded" }))?;
        tracing::info!(sub = claims.sub.as_deref().unwrap_or_default(), "session issued");
        Ok(response)
    }
}
