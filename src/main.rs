use cors_bridge::{build_router, Config, HttpProxyService};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cors_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Starting CORS bridge on port {}", config.port);
    tracing::info!(
        cache_enabled = config.cache.enabled,
        cache_dir = %config.cache.dir.display(),
        cache_ttl_secs = config.cache.ttl.as_secs(),
        verify_ssl = config.fetch.verify_ssl,
        allow_internal_targets = config.allow_internal_targets,
        "Configuration loaded"
    );
    if !config.fetch.verify_ssl {
        tracing::warn!("TLS certificate verification is disabled");
    }

    let app = build_router(HttpProxyService::arc(&config), &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", addr);
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "Server error");
        std::process::exit(1);
    }
}
