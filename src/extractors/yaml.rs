//! YAML normalization: parse and re-render so indentation and quoting are
//! consistent. Invalid YAML passes through as plain text.

use async_trait::async_trait;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct YamlExtractor {
    max_bytes: u64,
}

impl YamlExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for YamlExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        let text = match serde_yaml::from_str::<serde_yaml::Value>(&raw) {
            Ok(value) => serde_yaml::to_string(&value)
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| raw.trim().to_string()),
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
        "structured/yaml"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/yaml", "text/yaml", "application/x-yaml"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".yaml", ".yml"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}
