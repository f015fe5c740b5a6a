use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use textmill::app_state::AppState;
use textmill::config::Config;
use textmill::server::build_router;
use tower::ServiceExt;

const SECRET: &str = "0123456789abcdef0123456789abcdef-test";

fn test_state() -> AppState {
    let mut config = Config::from_env();
    config.internal_shared_secret = SECRET.to_string();
    config.rate_limit_burst = 3;
    config.rate_limit_every = std::time::Duration::from_secs(60);
    config.max_json_body_bytes = 1024;
    AppState::new(config)
}

fn post_extract(body: &str, client: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/extract")
        .header("Content-Type", "application/json")
        .header("X-Forwarded-For", client.to_string());
    if let Some(secret) = auth {
        builder = builder.header("X-Internal-Auth", secret.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn extract_requires_auth() {
    let app = build_router(test_state());
    let response = app
        .oneshot(post_extract(
            r#"{"presignedUrl": "https://cdn.example.com/a.pdf"}"#,
            "10.1.1.1",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "unauthorized");
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let app = build_router(test_state());
    let response = app
        .oneshot(post_extract(
            r#"{"presignedUrl": "https://cdn.example.com/a.pdf"}"#,
            "10.1.1.2",
            Some("wrong-secret"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_method_gets_405_envelope() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/extract")
                .header("X-Internal-Auth", SECRET)
                .header("X-Forwarded-For", "10.1.1.3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "method_not_allowed");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = build_router(test_state());
    let response = app
        .oneshot(post_extract("{not json", "10.1.1.4", Some(SECRET)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn missing_presigned_url_fails_validation() {
    let app = build_router(test_state());
    let response = app
        .oneshot(post_extract(
            r#"{"presignedUrl": "   "}"#,
            "10.1.1.5",
            Some(SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "validation_failed");
}

#[tokio::test]
async fn oversized_body_is_request_too_large() {
    let app = build_router(test_state());
    let padding = "x".repeat(2000);
    let body = format!(r#"{{"presignedUrl": "{padding}"}}"#);
    let response = app
        .oneshot(post_extract(&body, "10.1.1.6", Some(SECRET)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "request_too_large");
}

#[tokio::test]
async fn single_client_storm_hits_rate_limit() {
    let state = test_state();
    let app = build_router(state);
    // The URL never resolves to a download: scheme validation fails fast, so
    // the storm exercises only the governor layers.
    let body = r#"{"presignedUrl": "ftp://cdn.example.com/a.pdf"}"#;

    let mut accepted = 0;
    let mut limited = 0;
    for _ in 0..8 {
        let response = app
            .clone()
            .oneshot(post_extract(body, "203.0.113.77", Some(SECRET)))
            .await
            .unwrap();
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                limited += 1;
                assert_eq!(
                    response.headers().get("Retry-After").unwrap(),
                    "60",
                    "429 must carry Retry-After"
                );
                let json = body_json(response).await;
                assert_eq!(json["code"], "rate_limit");
            }
            status => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                accepted += 1;
            }
        }
    }

    assert_eq!(accepted, 3, "burst-many requests pass");
    assert_eq!(limited, 5, "the rest are limited");

    // A different client is unaffected.
    let response = app
        .oneshot(post_extract(body, "198.51.100.9", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_requires_auth_and_reports_counters() {
    let app = build_router(test_state());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header("X-Internal-Auth", SECRET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.get("totalRequests").is_some());
    assert!(json.get("activeRequests").is_some());
}

#[tokio::test]
async fn extractor_failure_uses_result_envelope_without_code() {
    let app = build_router(test_state());
    let response = app
        .oneshot(post_extract(
            r#"{"presignedUrl": "ftp://cdn.example.com/a.pdf"}"#,
            "10.1.1.7",
            Some(SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json.get("code").is_none(), "extractor-level errors carry no code");
    assert!(json["error"].as_str().unwrap().contains("invalid download URL"));
}
