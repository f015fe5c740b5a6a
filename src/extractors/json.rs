//! JSON normalization: parse and pretty-print so downstream chunking sees a
//! stable, readable rendering. Invalid JSON passes through as plain text.

use async_trait::async_trait;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct JsonExtractor {
    max_bytes: u64,
}

impl JsonExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for JsonExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        let text = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(raw),
            Err(_) => raw.trim().to_string(),
        };

        let (word_count, char_count) = build_counts(&text);
        Ok(ExtractionResult {
            success: true,
            text,
            method: "native".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            word_count,
            char_count,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "structured/json"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/json", "application/ld+json"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".json", ".jsonl", ".ndjson", ".geojson"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}
