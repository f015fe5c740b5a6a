//! Remote OCR provider client.
//!
//! Documents are OCR'd by URL (the provider fetches the presigned URL
//! itself); images may be URLs or base64 data URIs. Every invocation passes
//! through the process-wide OCR semaphore, retries up to three attempts on
//! non-4xx failures, and bounds both the response body and each page's
//! markdown.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

const MAX_RETRIES: usize = 2; // three attempts total
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MODEL: &str = "mistral-ocr-latest";
const MAX_PAGE_INDEX: usize = 10_000;
const MAX_RESPONSE_BYTES: u64 = 100 << 20;
const MAX_PAGE_MARKDOWN_BYTES: usize = 10 << 20;
const MAX_ERROR_BODY_BYTES: usize = 64 << 10;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR API key not configured")]
    NotConfigured,

    #[error("document URL required")]
    MissingUrl,

    #[error("invalid page: {0}")]
    InvalidPage(usize),

    #[error("OCR provider returned {status} ({error_type}): {message}")]
    Api {
        status: u16,
        error_type: String,
        message: String,
    },

    #[error("OCR request failed: {0}")]
    Request(String),

    #[error("OCR response too large")]
    ResponseTooLarge,

    #[error("decode OCR response: {0}")]
    Decode(String),

    #[error("OCR returned no pages")]
    NoPages,

    #[error("OCR page {index} markdown too large: {megabytes}MB")]
    PageTooLarge { index: usize, megabytes: usize },

    #[error("OCR capacity unavailable")]
    Capacity,

    #[error("OCR failed after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
}

impl OcrError {
    fn is_client_error(&self) -> bool {
        matches!(self, OcrError::Api { status, .. } if (400..500).contains(status))
    }
}

/// One OCR'd page; `index` is zero-based on the wire.
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub index: usize,
    pub markdown: String,
}

#[derive(Debug, Clone, Default)]
pub struct OcrResponse {
    pub pages: Vec<OcrPage>,
    pub model: String,
    pub pages_processed: u64,
}

/// The OCR capability the hybrid engine and the image extractor depend on.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn ocr_document(
        &self,
        document_url: &str,
        model: &str,
        pages0: &[usize],
        extract_header: bool,
        extract_footer: bool,
    ) -> Result<OcrResponse, OcrError>;

    async fn ocr_image(&self, image_url: &str, model: &str) -> Result<OcrResponse, OcrError>;
}

pub struct MistralOcr {
    api_key: String,
    api_url: String,
    timeout: Duration,
    retry_delay: Duration,
    limiter: Arc<Semaphore>,
    client: reqwest::Client,
}

impl MistralOcr {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
        limiter: Arc<Semaphore>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("textmill/1.0")
            .build()
            .expect("Failed to build OCR HTTP client");
        Self {
            api_key: api_key.into(),
            api_url: api_url.into(),
            timeout,
            retry_delay: DEFAULT_RETRY_DELAY,
            limiter,
            client,
        }
    }

    /// Shorten the inter-attempt delay (tests).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn run(&self, body: serde_json::Value) -> Result<OcrResponse, OcrError> {
        if self.api_key.trim().is_empty() {
            return Err(OcrError::NotConfigured);
        }

        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OcrError::Capacity)?;

        let mut last: Option<OcrError> = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt as u32).await;
            }

            match self.execute(&body).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let terminal = e.is_client_error();
                    warn!(attempt, error = %e, "OCR attempt failed");
                    last = Some(e);
                    if terminal {
                        break;
                    }
                }
            }
        }

        Err(OcrError::Exhausted {
            attempts: MAX_RETRIES + 1,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn execute(&self, body: &serde_json::Value) -> Result<OcrResponse, OcrError> {
        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| OcrError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status.as_u16(), response).await);
        }

        let bytes = read_limited(response, MAX_RESPONSE_BYTES).await?;
        let wire: WireResponse =
            serde_json::from_slice(&bytes).map_err(|e| OcrError::Decode(e.to_string()))?;
        validate_response(wire)
    }
}

#[async_trait]
impl OcrEngine for MistralOcr {
    async fn ocr_document(
        &self,
        document_url: &str,
        model: &str,
        pages0: &[usize],
        extract_header: bool,
        extract_footer: bool,
    ) -> Result<OcrResponse, OcrError> {
        if document_url.trim().is_empty() {
            return Err(OcrError::MissingUrl);
        }
        let model = if model.is_empty() { DEFAULT_MODEL } else { model };

        let pages = normalize_pages(pages0)?;

        let mut body = json!({
            "model": model,
            "document": {
                "type": "document_url",
                "document_url": document_url,
            },
        });
        if !pages.is_empty() {
            body["pages"] = json!(pages);
        }
        if extract_header {
            body["extract_header"] = json!(true);
        }
        if extract_footer {
            body["extract_footer"] = json!(true);
        }

        self.run(body).await
    }

    async fn ocr_image(&self, image_url: &str, model: &str) -> Result<OcrResponse, OcrError> {
        if image_url.trim().is_empty() {
            return Err(OcrError::MissingUrl);
        }
        let model = if model.is_empty() { DEFAULT_MODEL } else { model };

        let body = json!({
            "model": model,
            "document": {
                "type": "image_url",
                "image_url": image_url,
            },
        });

        self.run(body).await
    }
}

/// Sorted, deduplicated, each index within `0..=10_000`.
fn normalize_pages(pages0: &[usize]) -> Result<Vec<usize>, OcrError> {
    let unique: BTreeSet<usize> = pages0.iter().copied().collect();
    for page in &unique {
        if *page > MAX_PAGE_INDEX {
            return Err(OcrError::InvalidPage(*page));
        }
    }
    Ok(unique.into_iter().collect())
}

#[derive(Debug, Deserialize)]
struct WirePage {
    index: i64,
    #[serde(default)]
    markdown: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    pages_processed: u64,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    pages: Vec<WirePage>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage_info: WireUsage,
}

fn validate_response(wire: WireResponse) -> Result<OcrResponse, OcrError> {
    if wire.pages.is_empty() {
        return Err(OcrError::NoPages);
    }

    let mut pages = Vec::with_capacity(wire.pages.len());
    for page in wire.pages {
        if page.index < 0 {
            return Err(OcrError::Decode(format!(
                "invalid page index: {}",
                page.index
            )));
        }
        if page.markdown.len() > MAX_PAGE_MARKDOWN_BYTES {
            return Err(OcrError::PageTooLarge {
                index: page.index as usize,
                megabytes: page.markdown.len() / (1 << 20),
            });
        }
        pages.push(OcrPage {
            index: page.index as usize,
            markdown: page.markdown,
        });
    }

    Ok(OcrResponse {
        pages,
        model: wire.model,
        pages_processed: wire.usage_info.pages_processed,
    })
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    error: WireErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct WireErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    error_type: String,
}

async fn parse_error_response(status: u16, response: reqwest::Response) -> OcrError {
    let bytes = read_limited(response, MAX_ERROR_BODY_BYTES as u64)
        .await
        .unwrap_or_default();

    if let Ok(parsed) = serde_json::from_slice::<WireErrorBody>(&bytes) {
        if !parsed.error.message.is_empty() {
            return OcrError::Api {
                status,
                error_type: if parsed.error.error_type.is_empty() {
                    "unknown".to_string()
                } else {
                    parsed.error.error_type
                },
                message: parsed.error.message,
            };
        }
    }

    OcrError::Api {
        status,
        error_type: "unknown".to_string(),
        message: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

async fn read_limited(mut response: reqwest::Response, max_bytes: u64) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| OcrError::Request(e.to_string()))?
    {
        if buf.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(OcrError::ResponseTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
