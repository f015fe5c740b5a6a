//! Internal shared-secret authentication. The secret arrives in the
//! `X-Internal-Auth` header and is compared in constant time.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app_state::AppState;
use crate::server::dtos::{error_response, ErrorCode};

pub const AUTH_HEADER: &str = "x-internal-auth";

pub async fn internal_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(
        provided.as_bytes(),
        state.config.internal_shared_secret.as_bytes(),
    ) {
        return error_response(ErrorCode::Unauthorized, "Invalid authentication");
    }

    next.run(req).await
}

/// Equality without early exit on the first differing byte. Length is
/// checked by folding it into the accumulator rather than branching.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    let longest = a.len().max(b.len());
    for i in 0..longest {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}
