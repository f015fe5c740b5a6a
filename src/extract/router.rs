//! Request routing: fetch the artifact, resolve exactly one extractor under
//! the precedence rules, enforce its size limit, run it, and normalize the
//! result.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::fetcher;

use super::normalize;
use super::registry::Registry;
use super::types::{ExtractError, ExtractionResult, Job};

/// Body of `POST /extract` and `POST /preview`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExtractRequest {
    pub presigned_url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Map<String, Value>>,
}

pub struct Router {
    registry: Arc<Registry>,
    max_file_bytes: u64,
    download_timeout: Duration,
    allow_private_urls: bool,
}

impl Router {
    pub fn new(
        registry: Arc<Registry>,
        max_file_bytes: u64,
        download_timeout: Duration,
        allow_private_urls: bool,
    ) -> Self {
        Self {
            registry,
            max_file_bytes,
            download_timeout,
            allow_private_urls,
        }
    }

    /// Run one extraction end to end. Failures come back as a
    /// failed [`ExtractionResult`] rather than an `Err`, so the handler can
    /// serialize the same envelope either way. The artifact workspace is
    /// removed when this function returns, on every path.
    pub async fn extract(&self, req: &ExtractRequest) -> ExtractionResult {
        let file_name = req
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("input.bin");

        let artifact = match fetcher::download_to_temp(
            &req.presigned_url,
            file_name,
            self.max_file_bytes,
            self.download_timeout,
            self.allow_private_urls,
        )
        .await
        {
            Ok(a) => a,
            Err(e) => return ExtractionResult::failure(e.to_string()),
        };

        let extension = file_extension(file_name);
        let extractor = match self.registry.resolve(&artifact.mime_type, &extension) {
            Ok(e) => e,
            Err(e) => {
                return ExtractionResult {
                    success: false,
                    mime_type: artifact.mime_type.clone(),
                    file_type: "unknown".to_string(),
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };

        let max = extractor.max_file_size();
        if max > 0 && artifact.size > max {
            return ExtractionResult {
                success: false,
                mime_type: artifact.mime_type.clone(),
                file_type: extractor.name().to_string(),
                error: Some(ExtractError::TooLarge(max / (1 << 20)).to_string()),
                ..Default::default()
            };
        }

        let job = Job {
            presigned_url: req.presigned_url.clone(),
            local_path: artifact.path.clone(),
            file_name: file_name.to_string(),
            mime_type: artifact.mime_type.clone(),
            file_size: artifact.size,
            options: req.options.clone(),
        };

        match extractor.extract(&job).await {
            Ok(mut res) => {
                if res.mime_type.is_empty() {
                    res.mime_type = artifact.mime_type.clone();
                }
                if res.success {
                    normalize::finalize(res)
                } else {
                    // An unsuccessful result must carry an error message.
                    if res.error.is_none() {
                        res.error = Some("extraction failed".to_string());
                    }
                    res
                }
            }
            Err(e) => {
                warn!(extractor = extractor.name(), error = %e, "extraction failed");
                ExtractionResult {
                    success: false,
                    mime_type: artifact.mime_type.clone(),
                    file_type: extractor.name().to_string(),
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }
}

/// Lowercased extension of a file name including the dot, or empty.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => file_name[idx..].to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_extraction() {
        assert_eq!(file_extension("a.PDF"), ".pdf");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
        // dotfiles keep their whole name as the extension, matching the
        // plaintext extractor's registrations
        assert_eq!(file_extension(".gitignore"), ".gitignore");
        assert_eq!(file_extension("trailing."), "");
    }

    #[test]
    fn request_rejects_unknown_fields() {
        let err = serde_json::from_str::<ExtractRequest>(
            r#"{"presignedUrl": "https://x", "bogus": 1}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn request_parses_options() {
        let req: ExtractRequest = serde_json::from_str(
            r#"{"presignedUrl": "https://x", "fileName": "a.pdf", "options": {"minWordsThreshold": 10}}"#,
        )
        .unwrap();
        assert_eq!(req.file_name.as_deref(), Some("a.pdf"));
        assert!(req.options.unwrap().contains_key("minWordsThreshold"));
    }
}
