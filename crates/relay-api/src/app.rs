use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route(
            "/hls/{file}",
            get(routes::hls::master_playlist).options(routes::hls::preflight),
        )
        .route(
            "/hls/{channel}/index.m3u8",
            get(routes::hls::media_playlist).options(routes::hls::preflight),
        )
        .nest("/api/v1", routes::edges::router())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(5)))
        .layer(cors)
        .with_state(state)
}

/// Wildcard when no origins are configured, else echo a matching request
/// origin from the allow-list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ORIGIN])
        .max_age(Duration::from_secs(86400))
}

async fn health() -> &'static str {
    "ok"
}
