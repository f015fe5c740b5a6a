//! Global concurrency admission. Every endpoint that does real work passes
//! through the process-wide request semaphore; the permit is held for the
//! whole request and the active/total counters track it.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app_state::AppState;
use crate::metrics::Metrics;
use crate::server::dtos::{error_response, ErrorCode};

pub async fn concurrency_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let permit = match state.request_semaphore.clone().acquire_owned().await {
        Ok(p) => p,
        // Closed semaphore means the gate is gone (shutdown).
        Err(_) => return error_response(ErrorCode::Capacity, "Service at capacity"),
    };

    let _active = ActiveGuard::enter(&state.metrics);
    let response = next.run(req).await;
    drop(permit);
    response
}

/// Decrements the active counter on drop, so panics unwind correctly.
struct ActiveGuard<'a> {
    metrics: &'a Metrics,
}

impl<'a> ActiveGuard<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.inc_active();
        Self { metrics }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.metrics.dec_active();
    }
}
