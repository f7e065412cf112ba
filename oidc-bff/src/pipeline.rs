//! Per-route request pipeline: guard, interceptor `before`, proxy or
//! redirect, interceptor `after`.

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::guard::{Guard, IntrospectionGuard, NoOpGuard, StateGuard, StatePkceGuard};
use crate::interceptor::{
    AuthRequestInterceptor, Interceptor, NoOpInterceptor, TokenExchangeInterceptor,
};
use crate::proxy::{ProxyResponse, ReverseProxy};
use crate::route::{AuthorizationMode, BoundRoute, InterceptorMode};
use crate::session::SessionTokenCache;
use crate::store::{PendingAuthorizationStore, SessionStore};
use std::sync::Arc;

/// Shared collaborators every route pipeline is assembled from.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    pending: Arc<dyn PendingAuthorizationStore>,
    sessions: SessionTokenCache,
    proxy: ReverseProxy,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        pending: Arc<dyn PendingAuthorizationStore>,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let proxy = ReverseProxy::new(config.outbound_timeout)?;
        let sessions = SessionTokenCache::with_strategy(session_store, config.handle_strategy);
        Ok(Self {
            config: Arc::new(config),
            pending,
            sessions,
            proxy,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTokenCache {
        &self.sessions
    }

    pub fn proxy(&self) -> &ReverseProxy {
        &self.proxy
    }

    pub fn guard_for(&self, mode: &AuthorizationMode) -> Arc<dyn Guard> {
        match mode {
            AuthorizationMode::NoOp => Arc::new(NoOpGuard),
            AuthorizationMode::StateMatch => {
                Arc::new(StateGuard::new(self.config.cookie_names.state.clone()))
            }
            AuthorizationMode::StateAndPkce => {
                Arc::new(StatePkceGuard::new(self.pending.clone(), self.config.pending_ttl))
            }
            AuthorizationMode::Introspect { url, source } => Arc::new(
                IntrospectionGuard::new(
                    self.proxy.client().clone(),
                    url.clone(),
                    self.config.client_id.clone(),
                    self.config.client_secret.clone(),
                    self.sessions.clone(),
                    self.config.cookie_names.session.clone(),
                )
                .with_source(*source),
            ),
        }
    }

    pub fn interceptor_for(&self, mode: InterceptorMode) -> Arc<dyn Interceptor> {
        match mode {
            InterceptorMode::NoOp => Arc::new(NoOpInterceptor),
            InterceptorMode::AuthRequest => Arc::new(AuthRequestInterceptor::new(
                self.pending.clone(),
                self.config.cookie_names.clone(),
                self.config.pending_ttl,
                self.config.authorization_cookie_max_age,
            )),
            InterceptorMode::TokenExchange => Arc::new(TokenExchangeInterceptor::new(
                self.pending.clone(),
                self.sessions.clone(),
                self.config.cookie_names.clone(),
                self.config.session_ttl,
            )),
        }
    }

    pub fn bind(&self, route: BoundRoute) -> RoutePipeline {
        RoutePipeline {
            guard: self.guard_for(&route.authorization),
            interceptor: self.interceptor_for(route.interceptor),
            route: Arc::new(route),
        }
    }
}

/// A bound route with its guard and interceptor resolved.
#[derive(Clone)]
pub struct RoutePipeline {
    route: Arc<BoundRoute>,
    guard: Arc<dyn Guard>,
    interceptor: Arc<dyn Interceptor>,
}

impl RoutePipeline {
    pub fn route(&self) -> &BoundRoute {
        &self.route
    }

    /// Run the whole pipeline. On error the caller still owns `ctx`, so any
    /// cookies queued before the failure can be emitted.
    pub async fn run(&self, proxy: &ReverseProxy, ctx: &mut RequestContext) -> Result<ProxyResponse> {
        if !self.guard.can_activate(ctx).await? {
            tracing::warn!(path = %self.route.path, "guard refused request");
            return Err(Error::Forbidden);
        }

        self.interceptor.before(ctx).await?;

        let response = proxy
            .forward(&self.route.template, &self.route.outbound_method, ctx)
            .await?;

        self.interceptor.after(ctx, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{EndpointRoute, RequestTemplate, RouteTable};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use http::{Method, StatusCode};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway() -> Gateway {
        let store = Arc::new(MemoryStore::new());
        Gateway::new(GatewayConfig::new("bff", "secret"), store.clone(), store).unwrap()
    }

    fn bound(route: EndpointRoute) -> BoundRoute {
        RouteTable::build(vec![route]).unwrap().routes()[0].clone()
    }

    struct Refuse;

    #[async_trait]
    impl Guard for Refuse {
        async fn can_activate(&self, _ctx: &mut RequestContext) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn refused_guard_short_circuits_before_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let gw = gateway();
        let route = bound(EndpointRoute {
            path: "/a".into(),
            method: "get".into(),
            authenticate: None,
            authorize: None,
            request_template: RequestTemplate {
                url: server.uri(),
                ..Default::default()
            },
        });
        let pipeline = RoutePipeline {
            route: Arc::new(route),
            guard: Arc::new(Refuse),
            interceptor: Arc::new(NoOpInterceptor),
        };

        let mut ctx = RequestContext::new(Method::GET);
        let err = pipeline.run(gw.proxy(), &mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }

    #[tokio::test]
    async fn state_guard_failure_skips_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let gw = gateway();
        let pipeline = gw.bind(bound(EndpointRoute {
            path: "/callback".into(),
            method: "get".into(),
            authenticate: None,
            authorize: Some(crate::route::AuthorizeConfig {
                kind: "state".into(),
                url: None,
                source: None,
            }),
            request_template: RequestTemplate {
                url: server.uri(),
                ..Default::default()
            },
        }));

        let mut ctx = RequestContext::new(Method::GET).with_query("state", "s1");
        let err = pipeline.run(gw.proxy(), &mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn noop_route_proxies_with_route_method() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/posts/7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway();
        let pipeline = gw.bind(bound(EndpointRoute {
            path: "/posts".into(),
            method: "delete".into(),
            authenticate: None,
            authorize: None,
            request_template: RequestTemplate {
                url: format!("{}/posts/{{{{id}}}}", server.uri()),
                ..Default::default()
            },
        }));

        let mut ctx = RequestContext::new(Method::DELETE).with_body("id", 7);
        let response = pipeline.run(gw.proxy(), &mut ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }
}
