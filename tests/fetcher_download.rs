use std::time::Duration;

use textmill::fetcher::{download_to_temp, FetchError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

// Mock servers listen on 127.0.0.1, so tests run with the operator flag
// that permits private download targets.
const ALLOW_PRIVATE: bool = true;

#[tokio::test]
async fn downloads_and_sniffs_pdf() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n".to_vec())
                .insert_header("Content-Type", "application/octet-stream"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/doc.pdf", server.uri());
    let artifact = download_to_temp(&url, "doc.pdf", 1 << 20, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap();

    assert_eq!(artifact.mime_type, "application/pdf");
    assert_eq!(artifact.size, 30);
    assert!(artifact.path.exists());
    assert!(artifact.path.ends_with("doc.pdf"));
}

#[tokio::test]
async fn falls_back_to_declared_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"plain text with no magic bytes".to_vec())
                .insert_header("Content-Type", "text/plain; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/notes.txt", server.uri());
    let artifact = download_to_temp(&url, "notes.txt", 1 << 20, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap();

    assert_eq!(artifact.mime_type, "text/plain");
}

#[tokio::test]
async fn size_cap_is_exact() {
    let server = MockServer::start().await;
    let body = vec![b'x'; 1000];
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let url = format!("{}/file.bin", server.uri());

    // exactly max passes
    let artifact = download_to_temp(&url, "file.bin", 1000, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap();
    assert_eq!(artifact.size, 1000);

    // one byte over fails
    let err = download_to_temp(&url, "file.bin", 999, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooLarge(_)));
}

#[tokio::test]
async fn http_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/gone", server.uri());
    let err = download_to_temp(&url, "gone.bin", 1024, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Http(404)));
}

#[tokio::test]
async fn workspace_is_removed_when_artifact_drops() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/a.txt", server.uri());
    let artifact = download_to_temp(&url, "a.txt", 1024, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap();

    let dir = artifact.workspace.path().to_path_buf();
    assert!(dir.exists());
    drop(artifact);
    assert!(!dir.exists());
}

#[tokio::test]
async fn private_targets_are_rejected_without_the_flag() {
    let server = MockServer::start().await;
    let url = format!("{}/x", server.uri());

    let err = download_to_temp(&url, "x.bin", 1024, TIMEOUT, false)
        .await
        .unwrap_err();
    // http scheme + loopback host without the operator flag
    assert!(matches!(err, FetchError::InvalidUrl));
}

#[tokio::test]
async fn sanitizes_path_traversal_in_file_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/f", server.uri());
    let artifact = download_to_temp(&url, "../../etc/passwd", 1024, TIMEOUT, ALLOW_PRIVATE)
        .await
        .unwrap();

    assert!(artifact.path.starts_with(artifact.workspace.path()));
    assert!(artifact.path.ends_with("passwd"));
}
