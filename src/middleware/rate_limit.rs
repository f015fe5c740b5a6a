//! Per-client token-bucket rate limiting.
//!
//! One bucket per client identity, lazily inserted into a concurrent map.
//! The cleanup task clears the whole map on a timer instead of aging
//! individual entries; simpler, and the buckets refill instantly anyway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::app_state::AppState;
use crate::server::dtos::{error_response_with_headers, ErrorCode};

#[derive(Clone)]
pub struct RateLimit {
    store: Arc<DashMap<String, Bucket>>,
    every: Duration,
    burst: u32,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

impl RateLimit {
    /// One token per `every`, up to `burst` banked tokens.
    pub fn new(every: Duration, burst: u32) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            every: if every.is_zero() {
                Duration::from_millis(600)
            } else {
                every
            },
            burst: burst.max(1),
        }
    }

    /// Take one token for `key`, refilling for elapsed time first.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.burst as f64,
            refreshed: now,
        });
        let bucket = entry.value_mut();

        let refill = now.duration_since(bucket.refreshed).as_secs_f64() / self.every.as_secs_f64();
        bucket.tokens = (bucket.tokens + refill).min(self.burst as f64);
        bucket.refreshed = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wholesale reset, called on the periodic cleanup tick to bound memory.
    pub fn reset(&self) {
        self.store.clear();
    }

    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }
}

/// Client identity: first hop of `X-Forwarded-For`, then `X-Real-IP`, then
/// the remote address.
pub fn client_identity(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0);
    let identity = client_identity(req.headers(), remote);

    if !state.rate_limit.allow(&identity) {
        return error_response_with_headers(
            ErrorCode::RateLimit,
            "Rate limit exceeded",
            &[("Retry-After", "60")],
        );
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_reject() {
        let limit = RateLimit::new(Duration::from_secs(60), 3);
        assert!(limit.allow("a"));
        assert!(limit.allow("a"));
        assert!(limit.allow("a"));
        assert!(!limit.allow("a"));
        // other clients are unaffected
        assert!(limit.allow("b"));
    }

    #[test]
    fn refills_over_time() {
        let limit = RateLimit::new(Duration::from_millis(10), 1);
        assert!(limit.allow("a"));
        assert!(!limit.allow("a"));
        std::thread::sleep(Duration::from_millis(25));
        assert!(limit.allow("a"));
    }

    #[test]
    fn reset_clears_all_buckets() {
        let limit = RateLimit::new(Duration::from_secs(60), 1);
        assert!(limit.allow("a"));
        assert!(!limit.allow("a"));
        limit.reset();
        assert_eq!(limit.tracked_clients(), 0);
        assert!(limit.allow("a"));
    }

    #[test]
    fn identity_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        let remote: Option<SocketAddr> = Some("127.0.0.1:9999".parse().unwrap());
        assert_eq!(client_identity(&headers, remote), "203.0.113.9");

        headers.remove("x-forwarded-for");
        assert_eq!(client_identity(&headers, remote), "198.51.100.2");

        headers.remove("x-real-ip");
        assert_eq!(client_identity(&headers, remote), "127.0.0.1");

        assert_eq!(client_identity(&headers, None), "unknown");
    }
}
