//! Core data model shared by every extractor: the immutable per-request
//! [`Job`], the unified [`ExtractionResult`] wire shape, per-page results,
//! and the canonical word/char counters.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Input handed to an extractor. Immutable for the duration of one
/// extraction.
#[derive(Debug, Clone)]
pub struct Job {
    /// Original presigned URL the artifact was fetched from.
    pub presigned_url: String,
    /// Local path of the downloaded artifact inside its workspace.
    pub local_path: PathBuf,
    /// Declared file name (sanitized base name).
    pub file_name: String,
    /// Detected MIME type.
    pub mime_type: String,
    /// Artifact size in bytes.
    pub file_size: u64,
    /// Free-form per-request options; keys are extractor-specific.
    pub options: Option<serde_json::Map<String, Value>>,
}

/// How a page's text was obtained. `NeedsOcr` is a transient intra-pipeline
/// state and never appears in emitted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMethod {
    #[serde(rename = "text-layer")]
    TextLayer,
    #[serde(rename = "needs-ocr")]
    NeedsOcr,
    #[serde(rename = "ocr")]
    Ocr,
}

/// Per-page output of the hybrid PDF engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// One-based page number.
    pub page_number: usize,
    pub text: String,
    pub method: PageMethod,
    pub word_count: usize,
}

/// Unified result shape returned by every extractor.
///
/// Invariant: when `success` is true, `error` is absent; when `success` is
/// false, `error` is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    pub text: String,
    pub method: String,
    pub file_type: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    pub word_count: usize,
    pub char_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// A failed result carrying only an error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Errors surfaced by extractors to the router. The router folds these into
/// a failed [`ExtractionResult`]; messages are sanitized at the server
/// boundary.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Failed(String),
    #[error("file exceeds extractor limit ({0}MB)")]
    TooLarge(u64),
    #[error("no extractor registered for mime={mime:?} extension={extension:?}")]
    NoExtractor { mime: String, extension: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file-type handler. Implementations are registered once at startup and
/// invoked through the registry; they must be safe to share across requests.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError>;
    fn name(&self) -> &'static str;
    fn supported_types(&self) -> &'static [&'static str];
    fn supported_extensions(&self) -> &'static [&'static str];
    /// Maximum accepted artifact size in bytes; 0 means unlimited.
    fn max_file_size(&self) -> u64;
}

/// Canonical word/char counter: chars are Unicode code points, words are
/// maximal runs not containing space, tab, CR, or LF.
pub fn build_counts(text: &str) -> (usize, usize) {
    let char_count = text.chars().count();
    let mut word_count = 0;
    let mut in_word = false;
    for c in text.chars() {
        if matches!(c, ' ' | '\n' | '\t' | '\r') {
            if in_word {
                word_count += 1;
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if in_word {
        word_count += 1;
    }
    (word_count, char_count)
}

// Option-map accessors. Request options arrive as loose JSON; these coerce
// the common encodings (number, numeric string, bool string) instead of
// failing the whole request on a lenient client.

pub fn int_option(
    options: Option<&serde_json::Map<String, Value>>,
    key: &str,
    fallback: usize,
) -> usize {
    let Some(v) = options.and_then(|o| o.get(key)) else {
        return fallback;
    };
    match v {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n as usize)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as usize))
            .unwrap_or(fallback),
        Value::String(s) => s.trim().parse::<usize>().unwrap_or(fallback),
        _ => fallback,
    }
}

pub fn float_option(options: Option<&serde_json::Map<String, Value>>, key: &str) -> Option<f64> {
    match options.and_then(|o| o.get(key))? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn string_option(
    options: Option<&serde_json::Map<String, Value>>,
    key: &str,
    fallback: &str,
) -> String {
    match options.and_then(|o| o.get(key)) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn bool_option(
    options: Option<&serde_json::Map<String, Value>>,
    key: &str,
    fallback: bool,
) -> bool {
    match options.and_then(|o| o.get(key)) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().parse::<bool>().unwrap_or(fallback),
        _ => fallback,
    }
}

/// A `pages` option: an array of one-based page numbers.
pub fn pages_option(options: Option<&serde_json::Map<String, Value>>, key: &str) -> Vec<usize> {
    match options.and_then(|o| o.get(key)) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_u64())
            .filter(|n| *n >= 1)
            .map(|n| n as usize)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_words_and_chars() {
        assert_eq!(build_counts(""), (0, 0));
        assert_eq!(build_counts("hello"), (1, 5));
        assert_eq!(build_counts("hello world"), (2, 11));
        assert_eq!(build_counts("  spaced\tout\nwords\r\n"), (3, 20));
        // chars are code points, not bytes
        assert_eq!(build_counts("héllo 世界"), (2, 8));
    }

    #[test]
    fn page_method_serializes_as_tag() {
        assert_eq!(
            serde_json::to_string(&PageMethod::TextLayer).unwrap(),
            "\"text-layer\""
        );
        assert_eq!(serde_json::to_string(&PageMethod::Ocr).unwrap(), "\"ocr\"");
    }

    #[test]
    fn result_omits_absent_error_and_pages() {
        let res = ExtractionResult {
            success: true,
            text: "hi".into(),
            method: "native".into(),
            file_type: "text".into(),
            mime_type: "text/plain".into(),
            word_count: 1,
            char_count: 2,
            ..Default::default()
        };
        let s = serde_json::to_string(&res).unwrap();
        assert!(!s.contains("error"));
        assert!(!s.contains("pages"));
        assert!(s.contains("\"wordCount\":1"));
    }

    #[test]
    fn option_helpers_coerce_loose_json() {
        let opts: serde_json::Map<String, Value> = json!({
            "previewMaxPages": 5,
            "asString": "7",
            "ratio": 0.5,
            "flag": "true",
            "pages": [1, 3, 0, 2],
        })
        .as_object()
        .unwrap()
        .clone();
        let opts = Some(&opts);

        assert_eq!(int_option(opts, "previewMaxPages", 8), 5);
        assert_eq!(int_option(opts, "asString", 8), 7);
        assert_eq!(int_option(opts, "missing", 8), 8);
        assert_eq!(float_option(opts, "ratio"), Some(0.5));
        assert!(bool_option(opts, "flag", false));
        assert_eq!(pages_option(opts, "pages"), vec![1, 3, 2]);
    }
}
