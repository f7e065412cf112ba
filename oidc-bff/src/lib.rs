//! # oidc-bff
//!
//! A Backend-For-Frontend security gateway for OpenID Connect.
//!
//! The gateway runs the authorization code flow with PKCE on the server,
//! keeps access tokens in a shared session store and hands the browser only
//! an opaque, HTTP-only session cookie. Downstream calls are reverse-proxied
//! through request templates with `{{name}}` placeholders.
//!
//! ## Features
//!
//! - **Login flow**: state, nonce and PKCE values issued and checked server-side
//! - **Single-use authorization state**: pending logins are redeemed at most once
//! - **Opaque sessions**: access tokens never reach the browser
//! - **Guards**: state match, state + PKCE, RFC 7662 token introspection
//! - **Templated proxy**: URL, header and body templates, plus redirect mode
//! - **Pluggable storage**: in-memory for a single instance, Redis for fleets
//!
//! ## Example
//!
//! ```rust,no_run
//! use oidc_bff::{GatewayConfig, GatewayServer, route::load_routes_dir, store::MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> oidc_bff::Result<()> {
//! let routes = load_routes_dir("./config")?;
//! let server = GatewayServer::builder()
//!     .config(GatewayConfig::new("bff-client", "client-secret"))
//!     .store(Arc::new(MemoryStore::new()))
//!     .routes(routes)
//!     .build()?;
//!
//! let app = server.router();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod cookies;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod pipeline;
pub mod proxy;
pub mod route;
pub mod secret;
#[cfg(feature = "axum")]
pub mod server;
pub mod session;
pub mod store;
pub mod template;
pub mod token;

pub use config::GatewayConfig;
pub use context::RequestContext;
pub use cookies::CookieNames;
pub use error::{Error, Result};
pub use guard::Guard;
pub use interceptor::Interceptor;
pub use pipeline::{Gateway, RoutePipeline};
pub use proxy::{ProxyResponse, ReverseProxy};
pub use route::{EndpointRoute, RouteTable};
#[cfg(feature = "axum")]
pub use server::{GatewayServer, GatewayServerBuilder};
pub use session::{HandleStrategy, SessionTokenCache};
pub use store::{PendingAuthorizationStore, SessionStore};
