//! HTML to markdown-like text. Headings become `#` prefixes, paragraphs and
//! list items become blocks, and script/style/nav boilerplate is skipped.

use std::collections::HashMap;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct HtmlExtractor {
    max_bytes: u64,
}

impl HtmlExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for HtmlExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let html = String::from_utf8_lossy(&bytes).into_owned();

        let (text, metadata) = html_to_text(&html);
        let (word_count, char_count) = build_counts(&text);
        Ok(ExtractionResult {
            success: true,
            text,
            method: "native".to_string(),
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
        })
    }

    fn name(&self) -> &'static str {
        "document/html"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["text/html", "application/xhtml+xml"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".html", ".htm", ".xhtml"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

fn html_to_text(html: &str) -> (String, HashMap<String, String>) {
    let document = Html::parse_document(html);
    let mut metadata = HashMap::new();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(element) = document.select(&selector).next() {
            let title = element.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                metadata.insert("title".to_string(), title);
            }
        }
    }

    // One combined selector keeps blocks in document order.
    let mut blocks: Vec<String> = Vec::new();
    if let Ok(selector) = Selector::parse("h1, h2, h3, p, li, pre, blockquote") {
        for element in document.select(&selector) {
            let text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                continue;
            }
            let prefix = match element.value().name() {
                "h1" => "# ",
                "h2" => "## ",
                "h3" => "### ",
                _ => "",
            };
            blocks.push(format!("{prefix}{text}"));
        }
    }

    if blocks.is_empty() {
        // Structureless document: fall back to body text.
        if let Ok(selector) = Selector::parse("body") {
            if let Some(body) = document.select(&selector).next() {
                let text = body
                    .text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                if !text.is_empty() {
                    blocks.push(text);
                }
            }
        }
    }

    (blocks.join("\n\n"), metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_become_markdown() {
        let (text, meta) = html_to_text(
            "<html><head><title>Doc</title></head><body><h1>Top</h1><p>Body text here.</p></body></html>",
        );
        assert!(text.contains("# Top"));
        assert!(text.contains("Body text here."));
        assert_eq!(meta.get("title").unwrap(), "Doc");
    }

    #[test]
    fn scripts_are_ignored() {
        let (text, _) = html_to_text(
            "<html><body><p>keep</p><script>var x = 1;</script></body></html>",
        );
        assert!(text.contains("keep"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn structureless_body_falls_back_to_plain_text() {
        let (text, _) = html_to_text("<html><body>just   loose text</body></html>");
        assert_eq!(text, "just loose text");
    }
}
