//! HTTP handlers for the extraction surface, plus the outermost recovery
//! and request-log middleware.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::FutureExt;
use serde_json::json;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::extract::router::file_extension;
use crate::extract::types::{build_counts, int_option, ExtractionResult};
use crate::extract::ExtractRequest;
use crate::fetcher;
use crate::pdf::hybrid::truncate_chars;
use crate::server::dtos::{error_response, ErrorCode};

/// Extractors whose preview path is free (no OCR, no remote providers).
const PREVIEW_ALLOWED: &[&str] = &[
    "document/pdf",
    "document/office",
    "document/html",
    "text",
    "structured/csv",
    "structured/json",
    "structured/xml",
    "structured/yaml",
    "code/source",
    "code/notebook",
    "code/latex",
];

pub async fn universal_extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Response {
    let request = match parse_body(payload) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let run = state.router.extract(&request);
    let mut result = match tokio::time::timeout(state.config.universal_extract_timeout, run).await {
        Ok(result) => result,
        Err(_elapsed) => return error_response(ErrorCode::Timeout, "Extraction timed out"),
    };

    sanitize_result(&mut result);
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result)).into_response()
}

pub async fn preview(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Response {
    let request = match parse_body(payload) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let run = run_preview(&state, &request);
    match tokio::time::timeout(state.config.universal_extract_timeout, run).await {
        Ok(response) => response,
        Err(_elapsed) => error_response(ErrorCode::Timeout, "Preview timed out"),
    }
}

async fn run_preview(state: &AppState, request: &ExtractRequest) -> Response {
    let config = &state.config;
    let file_name = request
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("input.bin");

    let artifact = match fetcher::download_to_temp(
        &request.presigned_url,
        file_name,
        config.max_file_bytes,
        config.download_timeout,
        config.allow_private_download_urls,
    )
    .await
    {
        Ok(a) => a,
        Err(e) => {
            let mut result = ExtractionResult::failure(e.to_string());
            sanitize_result(&mut result);
            return (StatusCode::BAD_REQUEST, Json(result)).into_response();
        }
    };

    let extension = file_extension(file_name);
    let extractor = match state.registry.resolve(&artifact.mime_type, &extension) {
        Ok(e) => e,
        Err(e) => {
            let mut result = ExtractionResult {
                success: false,
                mime_type: artifact.mime_type.clone(),
                file_type: "unknown".to_string(),
                error: Some(e.to_string()),
                ..Default::default()
            };
            sanitize_result(&mut result);
            return (StatusCode::BAD_REQUEST, Json(result)).into_response();
        }
    };

    if !PREVIEW_ALLOWED.contains(&extractor.name()) {
        let result = ExtractionResult {
            success: false,
            mime_type: artifact.mime_type.clone(),
            file_type: extractor.name().to_string(),
            error: Some("preview unsupported for this file type".to_string()),
            ..Default::default()
        };
        return (StatusCode::BAD_REQUEST, Json(result)).into_response();
    }

    let options = request.options.as_ref();
    let preview_max_chars = int_option(options, "previewMaxChars", config.default_preview_max_chars);

    // PDFs get the dedicated text-layer-only preview path.
    if extractor.name() == "document/pdf" {
        let opts = state.hybrid.options_from(options);
        let preview = state.hybrid.preview(&artifact.path, &opts).await;

        if let Some(err) = preview.error {
            let mut result = ExtractionResult {
                success: false,
                method: "preview-text-layer".to_string(),
                file_type: "document/pdf".to_string(),
                mime_type: artifact.mime_type.clone(),
                error: Some(err),
                ..Default::default()
            };
            sanitize_result(&mut result);
            return (StatusCode::BAD_REQUEST, Json(result)).into_response();
        }

        let (text, _) = truncate_chars(&preview.text, preview_max_chars);
        let (word_count, char_count) = build_counts(&text);
        let metadata = HashMap::from([
            ("needsOcr".to_string(), preview.needs_ocr.to_string()),
            ("totalPages".to_string(), preview.total_pages.to_string()),
            (
                "textLayerPages".to_string(),
                preview.text_layer_pages.to_string(),
            ),
        ]);
        let result = ExtractionResult {
            success: true,
            text,
            method: "preview-text-layer".to_string(),
            file_type: "document/pdf".to_string(),
            mime_type: artifact.mime_type.clone(),
            metadata: Some(metadata),
            word_count,
            char_count,
            ..Default::default()
        };
        return (StatusCode::OK, Json(result)).into_response();
    }

    let job = crate::extract::Job {
        presigned_url: request.presigned_url.clone(),
        local_path: artifact.path.clone(),
        file_name: file_name.to_string(),
        mime_type: artifact.mime_type.clone(),
        file_size: artifact.size,
        options: request.options.clone(),
    };

    match extractor.extract(&job).await {
        Ok(mut result) if result.success => {
            if preview_max_chars > 0 {
                let (text, truncated) = truncate_chars(&result.text, preview_max_chars);
                if truncated {
                    result.text = text;
                    let (w, c) = build_counts(&result.text);
                    result.word_count = w;
                    result.char_count = c;
                }
            }
            if result.mime_type.is_empty() {
                result.mime_type = artifact.mime_type.clone();
            }
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(mut result) => {
            if result.error.is_none() {
                result.error = Some("extraction failed".to_string());
            }
            if result.mime_type.is_empty() {
                result.mime_type = artifact.mime_type.clone();
            }
            sanitize_result(&mut result);
            (StatusCode::BAD_REQUEST, Json(result)).into_response()
        }
        Err(e) => {
            let mut result = ExtractionResult {
                success: false,
                file_type: extractor.name().to_string(),
                mime_type: artifact.mime_type.clone(),
                error: Some(e.to_string()),
                ..Default::default()
            };
            sanitize_result(&mut result);
            (StatusCode::BAD_REQUEST, Json(result)).into_response()
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Response {
    let (_, active) = state.metrics.get();

    let mut ratio = state.config.health_degrade_ratio;
    if ratio <= 0.0 || ratio > 1.0 {
        ratio = 0.9;
    }
    let threshold = (state.config.max_concurrent_requests as f64 * ratio) as u64;

    let (status, code) = if active >= threshold.max(1) {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("healthy", StatusCode::OK)
    };

    (
        code,
        Json(json!({
            "status": status,
            "active": active,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let (total, active) = state.metrics.get();
    (
        StatusCode::OK,
        Json(json!({
            "activeRequests": active,
            "totalRequests": total,
            "trackedClients": state.rate_limit.tracked_clients(),
        })),
    )
        .into_response()
}

pub async fn method_not_allowed() -> Response {
    error_response(ErrorCode::MethodNotAllowed, "Method must be POST")
}

/// Outermost middleware: turn panics into a 500 envelope instead of a
/// connection reset.
pub async fn recovery_middleware(req: Request, next: Next) -> Response {
    match std::panic::AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(_panic) => {
            error!("handler panicked");
            error_response(ErrorCode::InternalError, "Internal server error")
        }
    }
}

pub async fn request_log_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = sanitize_log_string(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn parse_body(
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<ExtractRequest, Response> {
    let request = match payload {
        Ok(Json(r)) => r,
        Err(rejection) => {
            let code = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ErrorCode::RequestTooLarge
            } else {
                ErrorCode::BadRequest
            };
            return Err(error_response(code, &rejection.body_text()));
        }
    };

    if request.presigned_url.trim().is_empty() {
        return Err(error_response(
            ErrorCode::ValidationFailed,
            "presignedUrl required",
        ));
    }
    Ok(request)
}

/// Strip the local temp prefix from outgoing error messages and bound their
/// length.
fn sanitize_result(result: &mut ExtractionResult) {
    if let Some(err) = result.error.take() {
        result.error = Some(sanitize_error(&err));
    }
}

fn sanitize_error(message: &str) -> String {
    let tmp = std::env::temp_dir();
    let tmp_str = tmp.to_string_lossy();
    let mut message = message.replace(tmp_str.as_ref(), "[tmp]");
    if message.chars().count() > 300 {
        message = message.chars().take(300).collect::<String>() + "...";
    }
    message
}

fn sanitize_log_string(s: &str) -> String {
    let mut s: String = s.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    if s.len() > 200 {
        s.truncate(200);
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_temp_paths_in_errors() {
        let tmp = std::env::temp_dir();
        let raw = format!("open {}/textmill-abc/input.pdf: no such file", tmp.display());
        let cleaned = sanitize_error(&raw);
        assert!(cleaned.contains("[tmp]"));
        assert!(!cleaned.contains(&*tmp.to_string_lossy()));
    }

    #[test]
    fn long_errors_are_truncated() {
        let cleaned = sanitize_error(&"x".repeat(500));
        assert_eq!(cleaned.chars().count(), 303);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn log_strings_lose_newlines() {
        assert_eq!(sanitize_log_string("/a\r\n/b"), "/a/b");
    }
}
