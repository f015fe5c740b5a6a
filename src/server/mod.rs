pub mod dtos;
pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;
use crate::middleware::{
    concurrency_limit_middleware, internal_auth_middleware, rate_limit_middleware,
};

/// Assemble the HTTP surface. Layer order per endpoint, outermost first:
/// method check (routing) → internal auth → per-client rate limit → global
/// concurrency admission → handler.
pub fn build_router(state: AppState) -> Router {
    let extract_routes = Router::new()
        .route(
            "/extract",
            post(handlers::universal_extract).fallback(handlers::method_not_allowed),
        )
        .route(
            "/preview",
            post(handlers::preview).fallback(handlers::method_not_allowed),
        )
        .layer(from_fn_with_state(
            state.clone(),
            concurrency_limit_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), internal_auth_middleware))
        .layer(DefaultBodyLimit::max(
            state.config.max_json_body_bytes as usize,
        ));

    let metrics_routes = Router::new()
        .route(
            "/metrics",
            get(handlers::metrics).fallback(handlers::method_not_allowed),
        )
        .layer(from_fn_with_state(state.clone(), internal_auth_middleware));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(metrics_routes)
        .merge(extract_routes)
        .layer(from_fn(handlers::request_log_middleware))
        .layer(from_fn(handlers::recovery_middleware))
        .with_state(state)
}
