//! Image handler: a cheap vision classification decides the route.
//!
//! - `text` content (handwriting, documents, screenshots) goes through OCR;
//!   the vision description is supplementary.
//! - `visual` content (photos, artwork) keeps the vision description as the
//!   primary text.
//! - `mixed` content (diagrams, charts) uses OCR text plus the description.
//!
//! When the classifier is unavailable the extractor falls back to OCR-only.
//! OCR output must pass a strict meaningful-text gate before it is accepted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};
use crate::ocr::{OcrEngine, OcrResponse};
use crate::vision::{VisionClassifier, VisionError};

const IMAGE_PAGE_SEPARATOR: &str = "\n\n-----\n\n";

pub struct ImageExtractor {
    ocr: Arc<dyn OcrEngine>,
    vision: Arc<dyn VisionClassifier>,
    ocr_model: String,
    vision_model: String,
    max_bytes: u64,
}

impl ImageExtractor {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        vision: Arc<dyn VisionClassifier>,
        ocr_model: impl Into<String>,
        vision_model: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            ocr,
            vision,
            ocr_model: ocr_model.into(),
            vision_model: vision_model.into(),
            max_bytes,
        }
    }

    async fn run_ocr(&self, image_url: &str) -> Result<String, String> {
        let response = self
            .ocr
            .ocr_image(image_url, &self.ocr_model)
            .await
            .map_err(|e| e.to_string())?;

        let combined = combine_ocr_pages(&response);
        let cleaned = clean_ocr_text(&combined);
        if cleaned.is_empty() {
            return Err("OCR produced empty text".to_string());
        }
        Ok(cleaned)
    }

    fn result(
        &self,
        job: &Job,
        text: String,
        method: &str,
        image_type: Option<&str>,
        description: Option<&str>,
    ) -> ExtractionResult {
        let (word_count, char_count) = build_counts(&text);
        let mut metadata = HashMap::new();
        if let Some(t) = image_type {
            if !t.is_empty() {
                metadata.insert("imageType".to_string(), t.to_string());
            }
        }
        if let Some(d) = description {
            if !d.is_empty() {
                metadata.insert("description".to_string(), d.to_string());
            }
        }

        ExtractionResult {
            success: true,
            text,
            method: method.to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            },
            word_count,
            char_count,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Extractor for ImageExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        // Both providers accept URLs and base64 data URIs, so artifacts
        // without a presigned URL are inlined.
        let image_url = if !job.presigned_url.trim().is_empty() {
            job.presigned_url.clone()
        } else {
            let data = tokio::fs::read(&job.local_path).await?;
            let mime = if job.mime_type.is_empty() {
                "image/png"
            } else {
                &job.mime_type
            };
            format!(
                "data:{};base64,{}",
                mime,
                base64::engine::general_purpose::STANDARD.encode(data)
            )
        };

        let classification = self
            .vision
            .classify(&image_url, &self.vision_model)
            .await;

        let vision = match classification {
            Ok(v) => v,
            Err(e) => {
                if !matches!(e, VisionError::NotConfigured) {
                    warn!(error = %e, "vision classification failed, falling back to OCR-only");
                }
                return match self.run_ocr(&image_url).await {
                    Ok(text) if is_ocr_meaningful(&text) => {
                        Ok(self.result(job, text, "ocr", None, None))
                    }
                    Ok(_) => Ok(ExtractionResult {
                        success: false,
                        method: "ocr".to_string(),
                        file_type: self.name().to_string(),
                        mime_type: job.mime_type.clone(),
                        error: Some("image contains no extractable text".to_string()),
                        ..Default::default()
                    }),
                    Err(message) => Ok(ExtractionResult {
                        success: false,
                        method: "ocr".to_string(),
                        file_type: self.name().to_string(),
                        mime_type: job.mime_type.clone(),
                        error: Some(message),
                        ..Default::default()
                    }),
                };
            }
        };

        match vision.content_type.as_str() {
            "text" | "mixed" => {
                let method = if vision.content_type == "mixed" {
                    "ocr+vision"
                } else {
                    "ocr"
                };
                match self.run_ocr(&image_url).await {
                    Ok(text) if is_ocr_meaningful(&text) => Ok(self.result(
                        job,
                        text,
                        method,
                        Some(&vision.image_type),
                        Some(&vision.description),
                    )),
                    // OCR failed or produced garbage: the description is
                    // still worth returning.
                    _ => Ok(self.result(
                        job,
                        vision.description.clone(),
                        "vision",
                        Some(&vision.image_type),
                        Some(&vision.description),
                    )),
                }
            }
            _ => Ok(self.result(
                job,
                vision.description.clone(),
                "vision",
                Some(&vision.image_type),
                Some(&vision.description),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "image"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/webp",
            "image/bmp",
            "image/tiff",
            "image/avif",
        ]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".tiff", ".tif", ".avif",
        ]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

fn combine_ocr_pages(response: &OcrResponse) -> String {
    let parts: Vec<&str> = response
        .pages
        .iter()
        .map(|p| p.markdown.trim())
        .filter(|md| !md.is_empty() && *md != ".")
        .collect();
    parts.join(IMAGE_PAGE_SEPARATOR)
}

static ZERO_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}-\u{200D}\u{FEFF}\u{00AD}\u{2060}]").unwrap());
static MARKDOWN_IMAGE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)!\[[^\]]*\]\([^)]*\)").unwrap());
static MARKDOWN_LINK_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\[[^\]]*\]\([^)]*\.(?:jpeg|jpg|png|gif|webp|svg|bmp|tiff?)\)").unwrap()
});
static STANDALONE_FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[\w-]+\.(?:jpeg|jpg|png|gif|webp|svg|bmp|tiff?)[ \t]*$").unwrap()
});
static EXCESSIVE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());
static TRAILING_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());

/// Light-touch cleaning for raw OCR markdown: invisible characters,
/// image/link references, and standalone image-filename lines go away.
fn clean_ocr_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = ZERO_WIDTH.replace_all(text, "");
    let text = MARKDOWN_IMAGE_REF.replace_all(&text, "");
    let text = MARKDOWN_LINK_REF.replace_all(&text, "");
    let text = STANDALONE_FILE_NAME.replace_all(&text, "");

    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = TRAILING_SPACES.replace_all(&text, "");
    let text = EXCESSIVE_NEWLINES.replace_all(&text, "\n\n\n");
    text.trim().to_string()
}

/// Strict meaningful-text gate: at least 3 letter/digit characters and at
/// least 30% letters/digits among non-space characters. Rejects lone emoji,
/// stray punctuation, and markdown remnants from non-text images.
fn is_ocr_meaningful(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let mut letters = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if c.is_alphanumeric() {
            letters += 1;
        }
    }
    if letters < 3 {
        return false;
    }
    total > 0 && (letters as f64 / total as f64) >= 0.30
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrPage;

    #[test]
    fn meaningful_gate_rejects_garbage() {
        assert!(!is_ocr_meaningful(""));
        assert!(!is_ocr_meaningful("!!"));
        assert!(!is_ocr_meaningful("ab"));
        assert!(!is_ocr_meaningful("a b !!! ### ((( ))) [[[ ]]]"));
        assert!(is_ocr_meaningful("abc"));
        assert!(is_ocr_meaningful("Receipt total: 42.17"));
    }

    #[test]
    fn cleaning_strips_image_refs_and_filenames() {
        let raw = "Real text\n![fig](chart.png)\nimg-01.png\nmore";
        let cleaned = clean_ocr_text(raw);
        assert!(cleaned.contains("Real text"));
        assert!(cleaned.contains("more"));
        assert!(!cleaned.contains("chart.png"));
        assert!(!cleaned.contains("img-01.png"));
    }

    #[test]
    fn combines_pages_and_drops_empties() {
        let resp = OcrResponse {
            pages: vec![
                OcrPage { index: 0, markdown: "one".to_string() },
                OcrPage { index: 1, markdown: ".".to_string() },
                OcrPage { index: 2, markdown: "two".to_string() },
            ],
            ..Default::default()
        };
        assert_eq!(combine_ocr_pages(&resp), "one\n\n-----\n\ntwo");
    }
}
