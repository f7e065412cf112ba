//! Templated reverse proxy.
//!
//! A [`RequestTemplate`] is rendered against the request's data source and
//! either dispatched upstream or turned into a redirect. Upstream responses
//! are returned as-is whatever their status; only failures below HTTP
//! become errors.

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::route::RequestTemplate;
use crate::template::{interpolate, interpolate_value, value_to_string};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Response headers that describe the upstream connection rather than the
/// payload. They are not forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    /// 302 to `location`, without any upstream call.
    pub fn redirect(location: &str) -> Result<Self> {
        let value = HeaderValue::from_str(location)
            .map_err(|e| Error::InvalidRequest(format!("invalid redirect location: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, value);
        Ok(Self {
            status: StatusCode::FOUND,
            headers,
            body: Vec::new(),
        })
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Swap the body for `value`, serialized as JSON.
    pub fn replace_json(&mut self, value: &Value) -> Result<()> {
        self.body = serde_json::to_vec(value).map_err(|e| Error::Internal(e.to_string()))?;
        self.headers.remove(header::CONTENT_ENCODING);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A fully rendered upstream call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

/// Render `template` against `params`.
///
/// For GET and HEAD the rendered body fields become query parameters, since
/// those outbound calls never carry a body. Otherwise the body is sent as a form
/// when the template's `Content-Type` says so, and as JSON in all other cases.
pub fn build_outbound(
    template: &RequestTemplate,
    method: &Method,
    params: &Map<String, Value>,
) -> Result<OutboundRequest> {
    let rendered = interpolate(&template.url, params);
    let mut url = Url::parse(&rendered)
        .map_err(|e| Error::Proxy(format!("invalid upstream url {rendered:?}: {e}")))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &template.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(&interpolate(value, params))
            .map_err(|e| Error::InvalidRequest(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }

    let body = template.body.as_ref().map(|body| interpolate_value(body, params));

    let body = match body {
        None => OutboundBody::None,
        Some(body) if *method == Method::GET || *method == Method::HEAD => {
            if let Value::Object(fields) = &body {
                if !fields.is_empty() {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in fields {
                        query.append_pair(key, &value_to_string(value));
                    }
                }
            }
            OutboundBody::None
        }
        Some(body) if is_form(&headers) => OutboundBody::Form(form_pairs(&body)),
        Some(body) => OutboundBody::Json(body),
    };

    Ok(OutboundRequest {
        method: method.clone(),
        url,
        headers,
        body,
    })
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn form_pairs(body: &Value) -> Vec<(String, String)> {
    match body {
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Percent-encode whatever a `Location` header cannot carry as-is, such as
/// non-ASCII text substituted from the request.
fn redirect_location(rendered: &str) -> String {
    match Url::parse(rendered) {
        Ok(url) => url.into(),
        Err(url::ParseError::RelativeUrlWithoutBase)
            if rendered.starts_with('/') && !rendered.starts_with("//") =>
        {
            match Url::parse("http://relative.invalid").and_then(|base| base.join(rendered)) {
                Ok(resolved) => resolved[url::Position::BeforePath..].to_string(),
                Err(_) => rendered.to_string(),
            }
        }
        Err(_) => rendered.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ReverseProxy {
    client: reqwest::Client,
}

impl ReverseProxy {
    /// Every outbound call is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Shared HTTP client, also used for introspection calls.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Forward the request described by `template`, or redirect when the
    /// template is in redirect mode.
    pub async fn forward(
        &self,
        template: &RequestTemplate,
        method: &Method,
        ctx: &RequestContext,
    ) -> Result<ProxyResponse> {
        if template.is_redirect {
            let location = interpolate(&template.url, ctx.params());
            return ProxyResponse::redirect(&redirect_location(&location));
        }

        let outbound = build_outbound(template, method, ctx.params())?;
        self.send(outbound).await
    }

    pub async fn send(&self, outbound: OutboundRequest) -> Result<ProxyResponse> {
        let mut request = self
            .client
            .request(outbound.method.clone(), outbound.url.clone())
            .headers(outbound.headers);
        request = match &outbound.body {
            OutboundBody::None => request,
            OutboundBody::Json(body) => request.json(body),
            OutboundBody::Form(pairs) => request.form(pairs),
        };

        let response = request.send().await.map_err(|e| {
            tracing::error!(
                method = %outbound.method,
                host = outbound.url.host_str().unwrap_or_default(),
                error = %e,
                "upstream call failed"
            );
            Error::from(e)
        })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }
        let body = response.bytes().await?.to_vec();

        tracing::debug!(
            method = %outbound.method,
            path = outbound.url.path(),
            status = status.as_u16(),
            "upstream responded"
        );

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}
