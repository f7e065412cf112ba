use crate::{
    config::GatewayConfig,
    context::RequestContext,
    error::{Error, Result},
    pipeline::{Gateway, RoutePipeline},
    proxy::ProxyResponse,
    route::{EndpointRoute, RouteTable},
    store::{PendingAuthorizationStore, SessionStore},
};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::Method,
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The gateway as an axum application: one handler serving every
/// configured route, parameterized by the route it was bound to.
#[derive(Clone)]
pub struct GatewayServer {
    gateway: Gateway,
    routes: RouteTable,
}

impl GatewayServer {
    pub fn builder() -> GatewayServerBuilder {
        GatewayServerBuilder::default()
    }

    /// Create the axum router with every configured route.
    pub fn router(&self) -> Router {
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

        for route in self.routes.routes() {
            let filter = method_filter(&route.method);
            let path = route.path.clone();
            tracing::info!(method = %route.method, path = %path, "registering route");

            let pipeline = self.gateway.bind(route.clone());
            let gateway = self.gateway.clone();
            let handler = move |request: Request| {
                let gateway = gateway.clone();
                let pipeline = pipeline.clone();
                async move { handle_route(gateway, pipeline, request).await }
            };

            let methods = by_path.remove(&path).unwrap_or_else(MethodRouter::new);
            by_path.insert(path, methods.on(filter, handler));
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| {
                router.route(&path, methods)
            })
    }
}

fn method_filter(method: &Method) -> MethodFilter {
    match method.as_str() {
        "POST" => MethodFilter::POST,
        "PUT" => MethodFilter::PUT,
        "DELETE" => MethodFilter::DELETE,
        "PATCH" => MethodFilter::PATCH,
        "HEAD" => MethodFilter::HEAD,
        "OPTIONS" => MethodFilter::OPTIONS,
        // the route table only admits the methods above and GET
        _ => MethodFilter::GET,
    }
}

async fn handle_route(gateway: Gateway, pipeline: RoutePipeline, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, gateway.config().max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Error::InvalidRequest(format!("unreadable request body: {e}")).into_response();
        }
    };

    let mut ctx = match RequestContext::from_parts(&parts, &bytes) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    let mut response = match pipeline.run(gateway.proxy(), &mut ctx).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    };

    // Cookies queued before a failure (e.g. expired login cookies) still go out.
    ctx.response_cookies().apply(response.headers_mut());
    response
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

// Builder for GatewayServer.
#[derive(Default)]
pub struct GatewayServerBuilder {
    config: Option<GatewayConfig>,
    pending_store: Option<Arc<dyn PendingAuthorizationStore>>,
    session_store: Option<Arc<dyn SessionStore>>,
    routes: Vec<EndpointRoute>,
}

impl GatewayServerBuilder {
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn pending_store(mut self, store: Arc<dyn PendingAuthorizationStore>) -> Self {
        self.pending_store = Some(store);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Use one backend for both pending authorizations and sessions.
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: PendingAuthorizationStore + SessionStore + 'static,
    {
        self.pending_store(store.clone()).session_store(store)
    }

    pub fn routes(mut self, routes: Vec<EndpointRoute>) -> Self {
        self.routes = routes;
        self
    }

    pub fn build(self) -> Result<GatewayServer> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("config required".to_string()))?;
        let pending_store = self
            .pending_store
            .ok_or_else(|| Error::Config("pending_store required".to_string()))?;
        let session_store = self
            .session_store
            .ok_or_else(|| Error::Config("session_store required".to_string()))?;

        let routes = RouteTable::build(self.routes)?;
        let gateway = Gateway::new(config, pending_store, session_store)?;

        Ok(GatewayServer { gateway, routes })
    }
}
