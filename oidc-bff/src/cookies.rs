use cookie::{Cookie, SameSite};
use http::HeaderMap;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};
use std::collections::HashMap;
use std::time::Duration;

/// Names of the cookies the gateway reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieNames {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub session: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            state: "STATE".into(),
            nonce: "NONCE".into(),
            code_verifier: "CODE_VERIFIER".into(),
            session: "BFF_OIDC_SESSION".into(),
        }
    }
}

/// Collect every `Cookie` header into a name/value map. Later values win.
pub fn parse_cookie_header(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|cookie| cookie.ok())
        .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
        .collect()
}

/// Cookies to emit on the response, in insertion order.
///
/// Every cookie is `HttpOnly`, `SameSite=Strict` and scoped to `/`.
#[derive(Debug, Default, Clone)]
pub struct ResponseCookies {
    jar: Vec<Cookie<'static>>,
}

impl ResponseCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str, max_age: Duration, secure: bool) {
        let cookie = Cookie::build((name.to_string(), value.to_string()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(secure)
            .path("/")
            .max_age(cookie::time::Duration::seconds(
                i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX),
            ))
            .build();
        self.replace(cookie);
    }

    /// Blank the cookie and tell the browser to drop it now.
    pub fn expire(&mut self, name: &str, secure: bool) {
        self.set(name, "", Duration::ZERO, secure);
    }

    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.jar.iter().find(|cookie| cookie.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.jar.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.jar.is_empty()
    }

    /// Append one `Set-Cookie` header per cookie.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for cookie in &self.jar {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie = cookie.name(), error = %e, "dropping unencodable cookie"),
            }
        }
    }

    fn replace(&mut self, cookie: Cookie<'static>) {
        self.jar.retain(|existing| existing.name() != cookie.name());
        self.jar.push(cookie);
    }
}
