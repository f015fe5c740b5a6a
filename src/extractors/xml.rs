//! XML to text: markup is stripped, element text content is kept, one block
//! per line of content. Good enough for RAG ingestion of config files,
//! sitemaps, and feeds without a schema-aware walker.

use async_trait::async_trait;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct XmlExtractor {
    max_bytes: u64,
}

impl XmlExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for XmlExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        let text = strip_markup(&raw);
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
        "structured/xml"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/xml", "text/xml", "application/rss+xml", "application/atom+xml"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".xml", ".rss", ".atom", ".svg"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

/// Drop tags, comments, CDATA wrappers, and processing instructions; keep
/// text content with basic entities decoded.
fn strip_markup(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 2);
    let mut rest = xml;

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let after = &rest[lt..];

        if let Some(body) = after.strip_prefix("<!--") {
            let end = body.find("-->").map(|i| i + 3).unwrap_or(body.len());
            rest = &body[end..];
        } else if let Some(body) = after.strip_prefix("<![CDATA[") {
            // CDATA content is text; copy it verbatim.
            let end = body.find("]]>").unwrap_or(body.len());
            out.push_str(&body[..end]);
            rest = &body[(end + 3).min(body.len())..];
        } else {
            let end = after.find('>').map(|i| i + 1).unwrap_or(after.len());
            rest = &after[end..];
            // Element boundaries separate text blocks.
            out.push('\n');
        }
    }
    out.push_str(rest);

    let decoded = decode_entities(&out);
    decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_keeps_text() {
        let xml = "<root><item>first</item><item>second</item></root>";
        assert_eq!(strip_markup(xml), "first\nsecond");
    }

    #[test]
    fn drops_comments_and_declarations() {
        let xml = "<?xml version=\"1.0\"?><!-- note --><a>kept</a>";
        assert_eq!(strip_markup(xml), "kept");
    }

    #[test]
    fn preserves_cdata_content() {
        let xml = "<a><![CDATA[raw <stuff> here]]></a>";
        assert_eq!(strip_markup(xml), "raw <stuff> here");
    }

    #[test]
    fn decodes_basic_entities() {
        let xml = "<a>fish &amp; chips &lt;hot&gt;</a>";
        assert_eq!(strip_markup(xml), "fish & chips <hot>");
    }
}
