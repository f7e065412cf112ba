use crate::cookies::{ResponseCookies, parse_cookie_header};
use crate::error::{Error, Result};
use http::{HeaderMap, HeaderValue, Method, header};
use serde_json::{Map, Value};
use std::collections::HashMap;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Per-request state shared by the guard, the interceptor and the proxy.
///
/// Anything queued in [`RequestContext::response_cookies`] is emitted on the
/// final response whether the pipeline succeeded or not.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    headers: HeaderMap,
    query: Map<String, Value>,
    body: Map<String, Value>,
    cookies: HashMap<String, String>,
    secure: bool,
    response_cookies: ResponseCookies,
}

impl RequestContext {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: Map::new(),
            body: Map::new(),
            cookies: HashMap::new(),
            secure: false,
            response_cookies: ResponseCookies::new(),
        }
    }

    /// Build the context from an inbound request head and its buffered body.
    pub fn from_parts(parts: &http::request::Parts, body: &[u8]) -> Result<Self> {
        let query = match parts.uri.query() {
            Some(query) => parse_form(query.as_bytes())?,
            None => Map::new(),
        };

        let body = if body.is_empty() {
            Map::new()
        } else if is_form(&parts.headers) {
            parse_form(body)?
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => return Err(Error::InvalidRequest(format!("malformed JSON body: {e}"))),
            }
        };

        let forwarded_https = parts
            .headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
        let secure = parts.uri.scheme_str() == Some("https") || forwarded_https;

        Ok(Self {
            method: parts.method.clone(),
            cookies: parse_cookie_header(&parts.headers),
            headers: parts.headers.clone(),
            query,
            body,
            secure,
            response_cookies: ResponseCookies::new(),
        })
    }

    pub fn with_query(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }

    pub fn with_body(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The template data source: query parameters for GET and HEAD, the
    /// body otherwise.
    pub fn params(&self) -> &Map<String, Value> {
        if self.reads_query() {
            &self.query
        } else {
            &self.body
        }
    }

    pub fn params_mut(&mut self) -> &mut Map<String, Value> {
        if self.reads_query() {
            &mut self.query
        } else {
            &mut self.body
        }
    }

    fn reads_query(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params().get(key)
    }

    pub fn insert_param(&mut self, key: &str, value: impl Into<Value>) {
        self.params_mut().insert(key.to_string(), value.into());
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).and_then(Value::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn response_cookies(&self) -> &ResponseCookies {
        &self.response_cookies
    }

    pub fn cookies_mut(&mut self) -> &mut ResponseCookies {
        &mut self.response_cookies
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn parse_form(raw: &[u8]) -> Result<Map<String, Value>> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw)
        .map_err(|e| Error::InvalidRequest(format!("malformed form data: {e}")))?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn parts(request: Request<()>) -> http::request::Parts {
        request.into_parts().0
    }

    #[test]
    fn get_reads_params_from_query() {
        let req = Request::get("/posts?id=33&p=abc").body(()).unwrap();
        let ctx = RequestContext::from_parts(&parts(req), b"").unwrap();

        assert_eq!(ctx.param("id"), Some(&Value::String("33".into())));
        assert_eq!(ctx.query_param("p"), Some("abc"));
    }

    #[test]
    fn head_reads_params_from_query() {
        let req = Request::head("/status?id=33").body(()).unwrap();
        let mut ctx = RequestContext::from_parts(&parts(req), b"").unwrap();

        assert_eq!(ctx.param("id"), Some(&Value::String("33".into())));
        ctx.insert_param("state", "s1");
        assert_eq!(ctx.query_param("state"), Some("s1"));
    }

    #[test]
    fn post_reads_params_from_json_body() {
        let req = Request::post("/token?ignored=1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts(req), br#"{"code":"c1","n":5}"#).unwrap();

        assert_eq!(ctx.param("code"), Some(&Value::String("c1".into())));
        assert_eq!(ctx.param("n"), Some(&Value::from(5)));
        assert!(ctx.param("ignored").is_none());
    }

    #[test]
    fn post_reads_form_body() {
        let req = Request::post("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts(req), b"code=c1&state=s%201").unwrap();
        assert_eq!(ctx.param("state"), Some(&Value::String("s 1".into())));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let req = Request::post("/token").body(()).unwrap();
        let err = RequestContext::from_parts(&parts(req), b"{nope").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn secure_follows_forwarded_proto() {
        let req = Request::get("/login")
            .header(FORWARDED_PROTO, "https")
            .header(header::COOKIE, "STATE=s1")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts(req), b"").unwrap();
        assert!(ctx.is_secure());
        assert_eq!(ctx.cookie("STATE"), Some("s1"));

        let plain = Request::get("/login").body(()).unwrap();
        assert!(!RequestContext::from_parts(&parts(plain), b"").unwrap().is_secure());
    }
}
