//! Office documents via headless LibreOffice. The binary converts the
//! artifact to plain text inside its own workspace directory; the converted
//! file is read back and the workspace cleanup removes both.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct OfficeExtractor {
    binary: String,
    timeout: Duration,
    max_bytes: u64,
}

impl OfficeExtractor {
    pub fn new(binary: impl Into<String>, timeout: Duration, max_bytes: u64) -> Self {
        let binary = binary.into();
        Self {
            binary: if binary.trim().is_empty() {
                "soffice".to_string()
            } else {
                binary
            },
            timeout,
            max_bytes,
        }
    }

    async fn convert_to_text(&self, input: &Path) -> Result<String, String> {
        let out_dir = input.parent().unwrap_or_else(|| Path::new("."));

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg("txt:Text")
            .arg("--outdir")
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = tokio::time::timeout(self.timeout, cmd.output()).await;
        let output = match run {
            Err(_elapsed) => return Err("office conversion timed out".to_string()),
            Ok(Err(e)) => return Err(format!("office conversion failed to start: {e}")),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), "office conversion failed");
            return Err(format!(
                "office conversion failed: {}",
                stderr.trim().chars().take(300).collect::<String>()
            ));
        }

        let txt_path: PathBuf = input.with_extension("txt");
        match tokio::fs::read(&txt_path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).trim().to_string()),
            Err(e) => Err(format!("converted text missing: {e}")),
        }
    }
}

#[async_trait]
impl Extractor for OfficeExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        match self.convert_to_text(&job.local_path).await {
            Ok(text) => {
                let (word_count, char_count) = build_counts(&text);
                Ok(ExtractionResult {
                    success: true,
                    text,
                    method: "libreoffice".to_string(),
                    file_type: self.name().to_string(),
                    mime_type: job.mime_type.clone(),
                    word_count,
                    char_count,
                    ..Default::default()
                })
            }
            Err(message) => Ok(ExtractionResult {
                success: false,
                method: "libreoffice".to_string(),
                file_type: self.name().to_string(),
                mime_type: job.mime_type.clone(),
                error: Some(message),
                ..Default::default()
            }),
        }
    }

    fn name(&self) -> &'static str {
        "document/office"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[
            "application/msword",
            "application/vnd.ms-excel",
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.oasis.opendocument.text",
            "application/vnd.oasis.opendocument.spreadsheet",
            "application/vnd.oasis.opendocument.presentation",
            "application/rtf",
        ]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".doc", ".xls", ".ppt", ".docx", ".xlsx", ".pptx", ".odt", ".ods", ".odp", ".rtf",
        ]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}
