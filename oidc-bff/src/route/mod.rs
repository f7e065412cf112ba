//! Route definitions and the validated route table built from them.

use crate::error::{Error, Result};
use crate::template::interpolate;
use http::Method;
use http::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

mod loader;

pub use loader::load_routes_dir;

/// One endpoint as written in a route file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRoute {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticate: Option<AuthenticateConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize: Option<AuthorizeConfig>,
    #[serde(alias = "requestConfig")]
    pub request_template: RequestTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Introspection endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Where the introspected token comes from: `session` or `bearer`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Outbound call description. Strings may carry `{{name}}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    pub url: String,
    /// Empty means "same as the inbound route"
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub is_redirect: bool,
}

/// Where an introspection guard finds the access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialSource {
    /// Session cookie resolved through the session token cache
    #[default]
    SessionCookie,
    /// `Authorization: Bearer <token>`
    BearerHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationMode {
    NoOp,
    StateMatch,
    StateAndPkce,
    Introspect { url: String, source: CredentialSource },
}

impl AuthorizationMode {
    pub fn resolve(config: Option<&AuthorizeConfig>) -> Result<Self> {
        let Some(config) = config else {
            return Ok(AuthorizationMode::NoOp);
        };

        match config.kind.as_str() {
            "state" => Ok(AuthorizationMode::StateMatch),
            "stateAndPKCE" => Ok(AuthorizationMode::StateAndPkce),
            "introspect" => {
                let url = config
                    .url
                    .clone()
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| Error::Config("introspect guard requires a url".to_string()))?;
                let source = match config.source.as_deref() {
                    None | Some("session") => CredentialSource::SessionCookie,
                    Some("bearer") => CredentialSource::BearerHeader,
                    Some(other) => {
                        return Err(Error::Config(format!(
                            "Unsupported introspection token source: {other}"
                        )));
                    }
                };
                Ok(AuthorizationMode::Introspect { url, source })
            }
            other => Err(Error::Config(format!(
                "Unsupported authorization guard type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorMode {
    NoOp,
    AuthRequest,
    TokenExchange,
}

impl InterceptorMode {
    pub fn resolve(config: Option<&AuthenticateConfig>) -> Result<Self> {
        match config.map(|c| c.kind.as_str()) {
            None => Ok(InterceptorMode::NoOp),
            Some("code") => Ok(InterceptorMode::AuthRequest),
            Some("token") => Ok(InterceptorMode::TokenExchange),
            Some(other) => Err(Error::Config(format!(
                "Unsupported authentication interceptor type: {other}"
            ))),
        }
    }
}

/// Map a configured method name onto an HTTP method.
pub fn parse_method(raw: &str) -> Result<Method> {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "get" => Ok(Method::GET),
        "post" => Ok(Method::POST),
        "put" => Ok(Method::PUT),
        "delete" => Ok(Method::DELETE),
        "patch" => Ok(Method::PATCH),
        "head" => Ok(Method::HEAD),
        "options" => Ok(Method::OPTIONS),
        _ => Err(Error::Config(format!("Unsupported HTTP method: {lower}"))),
    }
}

/// A route whose tags have all been resolved.
#[derive(Debug, Clone)]
pub struct BoundRoute {
    pub path: String,
    pub method: Method,
    pub authorization: AuthorizationMode,
    pub interceptor: InterceptorMode,
    pub template: RequestTemplate,
    /// Method used for the outbound call
    pub outbound_method: Method,
}

impl BoundRoute {
    fn bind(route: EndpointRoute) -> Result<Self> {
        let method = parse_method(&route.method)?;

        if !route.path.starts_with('/') {
            return Err(Error::Config(format!(
                "route path must start with '/': {}",
                route.path
            )));
        }
        if route.path.contains(['{', '}'])
            || route
                .path
                .split('/')
                .any(|segment| segment.starts_with([':', '*']))
        {
            return Err(Error::Config(format!(
                "route path must be static, pass values as query or body fields instead: {}",
                route.path
            )));
        }
        validate_headers(&route.request_template)?;

        let authorization = AuthorizationMode::resolve(route.authorize.as_ref())?;
        let interceptor = InterceptorMode::resolve(route.authenticate.as_ref())?;

        let outbound_method = if route.request_template.method.is_empty() {
            method.clone()
        } else {
            parse_method(&route.request_template.method)?
        };

        Ok(Self {
            path: route.path,
            method,
            authorization,
            interceptor,
            template: route.request_template,
            outbound_method,
        })
    }
}

/// Header names are fixed at load time; values are checked with every
/// placeholder rendered empty.
fn validate_headers(template: &RequestTemplate) -> Result<()> {
    let empty = Map::new();
    for (name, value) in &template.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {name:?}: {e}")))?;
        HeaderValue::from_str(&interpolate(value, &empty))
            .map_err(|e| Error::Config(format!("invalid value for header {name:?}: {e}")))?;
    }
    Ok(())
}

/// Every route, validated. Nothing is served unless this builds.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<BoundRoute>,
}

impl RouteTable {
    pub fn build(routes: Vec<EndpointRoute>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut bound = Vec::with_capacity(routes.len());

        for route in routes {
            let route = BoundRoute::bind(route)?;
            if !seen.insert((route.method.clone(), route.path.clone())) {
                return Err(Error::Config(format!(
                    "duplicate route: {} {}",
                    route.method, route.path
                )));
            }
            bound.push(route);
        }

        Ok(Self { routes: bound })
    }

    pub fn routes(&self) -> &[BoundRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
