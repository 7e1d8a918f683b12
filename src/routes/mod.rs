//! HTTP routes and router assembly.

pub mod health;
pub mod proxy;

use crate::config::Config;
use crate::proxy::ProxyService;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

const CORS_MAX_AGE: Duration = Duration::from_secs(86400);

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn ProxyService>,
}

/// Proxy endpoints at `/` and `/proxy`, plus `/api/health`, wrapped in the
/// CORS and trace layers.
pub fn build_router(service: Arc<dyn ProxyService>, config: &Config) -> Router {
    Router::new()
        .route(
            "/",
            get(proxy::proxy_request).post(proxy::proxy_request),
        )
        .route(
            "/proxy",
            get(proxy::proxy_request).post(proxy::proxy_request),
        )
        .route("/api/health", get(health::health_check))
        .with_state(AppState { service })
        .layer(cors_layer(&config.cors_allow_origin))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allow_origin: &str) -> CorsLayer {
    let origin = match allow_origin.trim() {
        "*" => AllowOrigin::any(),
        exact => match HeaderValue::from_str(exact) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin = exact, "Invalid CORS origin, allowing any");
                AllowOrigin::any()
            }
        },
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(CORS_MAX_AGE)
}
