use miette::{IntoDiagnostic, WrapErr};
use oidc_bff::{
    GatewayServer,
    route::load_routes_dir,
    store::{MemoryStore, RedisStore},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

mod settings;

use settings::Settings;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("server=info,oidc_bff=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let routes = load_routes_dir(&settings.routes_dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to load routes from {}", settings.routes_dir.display()))?;
    tracing::info!(count = routes.len(), dir = %settings.routes_dir.display(), "loaded routes");

    let builder = GatewayServer::builder()
        .config(settings.gateway_config())
        .routes(routes);

    let builder = match &settings.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .into_diagnostic()
                .wrap_err("failed to connect to redis")?;
            tracing::info!("using redis store");
            builder.store(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "REDIS_URL / REDIS_HOST not set, using in-memory store; sessions are lost on restart and not shared between instances"
            );
            let store = Arc::new(MemoryStore::new());
            spawn_purge(store.clone());
            builder.store(store)
        }
    };

    let server = builder
        .build()
        .into_diagnostic()
        .wrap_err("failed to build gateway")?;

    let app = server.router().layer(TraceLayer::new_for_http());

    tracing::info!("BFF gateway listening on {}", settings.bind_addr);
    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .into_diagnostic()
        .wrap_err("failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()
        .wrap_err("server error")?;

    Ok(())
}

fn spawn_purge(store: Arc<MemoryStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let removed = store.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "purged expired entries");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
