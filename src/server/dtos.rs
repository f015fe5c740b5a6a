//! Response envelopes for handler-level failures. Extractor-level failures
//! use the unified result shape instead and carry no `code`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    ValidationFailed,
    Unauthorized,
    MethodNotAllowed,
    RateLimit,
    Capacity,
    Timeout,
    RequestTooLarge,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::RateLimit => "rate_limit",
            ErrorCode::Capacity => "capacity",
            ErrorCode::Timeout => "timeout",
            ErrorCode::RequestTooLarge => "request_too_large",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest | ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Capacity => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

pub fn error_response(code: ErrorCode, message: &str) -> Response {
    (
        code.status(),
        Json(ErrorEnvelope {
            success: false,
            error: message.to_string(),
            code: code.as_str(),
        }),
    )
        .into_response()
}

pub fn error_response_with_headers(
    code: ErrorCode,
    message: &str,
    headers: &[(&'static str, &'static str)],
) -> Response {
    let mut response = error_response(code, message);
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(*name, value);
        }
    }
    response
}
