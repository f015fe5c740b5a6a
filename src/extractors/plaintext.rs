//! Plain text, markdown, and config-file passthrough. Specialized text
//! formats (HTML, CSV, JSON, XML, code, notebooks, LaTeX) have dedicated
//! extractors; this is the fallback for `text/plain` MIME and simple
//! text-based extensions.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};
use crate::extract::router::file_extension;

pub struct PlainTextExtractor {
    max_bytes: u64,
}

impl PlainTextExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let mut text = String::from_utf8_lossy(&bytes).into_owned();

        let ext = file_extension(&job.file_name);
        let mut file_type = "text/plain";
        if matches!(ext.as_str(), ".md" | ".mdx" | ".markdown") {
            text = strip_front_matter(&text).to_string();
            file_type = "text/markdown";
        }

        let text = normalize_text(&text);
        let (word_count, char_count) = build_counts(&text);
        Ok(ExtractionResult {
            success: true,
            text,
            method: "native".to_string(),
            file_type: file_type.to_string(),
            mime_type: job.mime_type.clone(),
            word_count,
            char_count,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["text/plain", "text/markdown"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".txt",
            ".text",
            ".log",
            ".ini",
            ".cfg",
            ".conf",
            ".env",
            ".properties",
            ".gitignore",
            ".dockerignore",
            ".editorconfig",
            ".md",
            ".mdx",
            ".markdown",
        ]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

static EXCESSIVE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    EXCESSIVE_NEWLINES
        .replace_all(&text, "\n\n\n")
        .trim()
        .to_string()
}

/// Drop a leading `---\n...\n---\n` YAML front matter block.
fn strip_front_matter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---\n") else {
        return text;
    };
    match rest.find("\n---\n") {
        Some(idx) => &rest[idx + 5..],
        None => text,
    }
}
