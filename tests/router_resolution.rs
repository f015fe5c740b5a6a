use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use textmill::extract::{
    ExtractError, ExtractRequest, ExtractionResult, Extractor, Job, Registry, Router,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StubExtractor {
    name: &'static str,
    types: &'static [&'static str],
    exts: &'static [&'static str],
    max_size: u64,
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        Ok(ExtractionResult {
            success: true,
            text: format!("handled by {}", self.name),
            method: "stub".to_string(),
            file_type: self.name.to_string(),
            mime_type: job.mime_type.clone(),
            ..Default::default()
        })
    }
    fn name(&self) -> &'static str {
        self.name
    }
    fn supported_types(&self) -> &'static [&'static str] {
        self.types
    }
    fn supported_extensions(&self) -> &'static [&'static str] {
        self.exts
    }
    fn max_file_size(&self) -> u64 {
        self.max_size
    }
}

fn test_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register(StubExtractor {
        name: "text",
        types: &["text/plain"],
        exts: &[".txt"],
        max_size: 0,
    });
    registry.register(StubExtractor {
        name: "code",
        types: &[],
        exts: &[".go"],
        max_size: 0,
    });
    registry.register(StubExtractor {
        name: "tiny",
        types: &[],
        exts: &[".tiny"],
        max_size: 8,
    });
    Arc::new(registry)
}

async fn serve_text(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.as_bytes().to_vec())
                .insert_header("Content-Type", "text/plain"),
        )
        .mount(server)
        .await;
}

fn router(registry: Arc<Registry>) -> Router {
    Router::new(registry, 1 << 20, Duration::from_secs(5), true)
}

#[tokio::test]
async fn extension_beats_sniffed_mime() {
    let server = MockServer::start().await;
    serve_text(&server, "/main.go", "package main").await;

    let request = ExtractRequest {
        presigned_url: format!("{}/main.go", server.uri()),
        file_name: Some("main.go".to_string()),
        options: None,
    };
    let result = router(test_registry()).extract(&request).await;

    assert!(result.success);
    assert_eq!(result.file_type, "code");
}

#[tokio::test]
async fn mime_match_without_extension() {
    let server = MockServer::start().await;
    serve_text(&server, "/readme", "hello there").await;

    let request = ExtractRequest {
        presigned_url: format!("{}/readme", server.uri()),
        file_name: Some("readme".to_string()),
        options: None,
    };
    let result = router(test_registry()).extract(&request).await;

    assert!(result.success);
    assert_eq!(result.file_type, "text");
}

#[tokio::test]
async fn unknown_type_fails_with_no_extractor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8, 1, 2, 3])
                .insert_header("Content-Type", "application/octet-stream"),
        )
        .mount(&server)
        .await;

    let request = ExtractRequest {
        presigned_url: format!("{}/blob", server.uri()),
        file_name: Some("blob.weird".to_string()),
        options: None,
    };
    let result = router(test_registry()).extract(&request).await;

    assert!(!result.success);
    assert_eq!(result.file_type, "unknown");
    assert!(result.error.unwrap().contains("no extractor registered"));
}

#[tokio::test]
async fn extractor_size_limit_is_enforced() {
    let server = MockServer::start().await;
    serve_text(&server, "/big.tiny", "more than eight bytes").await;

    let request = ExtractRequest {
        presigned_url: format!("{}/big.tiny", server.uri()),
        file_name: Some("big.tiny".to_string()),
        options: None,
    };
    let result = router(test_registry()).extract(&request).await;

    assert!(!result.success);
    assert_eq!(result.file_type, "tiny");
    assert!(result.error.unwrap().contains("exceeds extractor limit"));
}

#[tokio::test]
async fn invalid_url_fails_before_any_download() {
    let request = ExtractRequest {
        presigned_url: "ftp://example.com/file".to_string(),
        file_name: None,
        options: None,
    };
    let result = router(test_registry()).extract(&request).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("invalid download URL"));
}
