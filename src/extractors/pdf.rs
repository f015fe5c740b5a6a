//! PDF handler: delegates to the hybrid text-layer/OCR engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};
use crate::pdf::HybridProcessor;

pub struct PdfExtractor {
    processor: Arc<HybridProcessor>,
    max_bytes: u64,
}

impl PdfExtractor {
    pub fn new(processor: Arc<HybridProcessor>, max_bytes: u64) -> Self {
        Self {
            processor,
            max_bytes,
        }
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let opts = self.processor.options_from(job.options.as_ref());
        let out = self
            .processor
            .process(&job.presigned_url, &job.local_path, &opts)
            .await;

        if out.pages.is_empty() && !out.success {
            // Nothing was extracted at all (page count failed, etc).
            return Ok(ExtractionResult {
                success: false,
                method: "hybrid".to_string(),
                file_type: self.name().to_string(),
                mime_type: job.mime_type.clone(),
                error: Some(out.error.unwrap_or_else(|| "extraction failed".to_string())),
                ..Default::default()
            });
        }

        let (word_count, char_count) = build_counts(&out.text);
        Ok(ExtractionResult {
            success: out.success,
            text: out.text,
            method: "hybrid".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            pages: Some(out.pages),
            word_count,
            char_count,
            error: out.error,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "document/pdf"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/pdf"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".pdf"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}
