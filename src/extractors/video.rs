//! Video transcription: the audio track is demuxed with ffmpeg into a mono
//! 16 kHz mp3 inside the artifact workspace, then follows the audio path.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::extract::types::{ExtractError, ExtractionResult, Extractor, Job};
use crate::extractors::audio::AudioExtractor;

pub struct VideoExtractor {
    binary: String,
    timeout: Duration,
    audio: Arc<AudioExtractor>,
    max_bytes: u64,
}

impl VideoExtractor {
    pub fn new(
        binary: impl Into<String>,
        timeout: Duration,
        audio: Arc<AudioExtractor>,
        max_bytes: u64,
    ) -> Self {
        let binary = binary.into();
        Self {
            binary: if binary.trim().is_empty() {
                "ffmpeg".to_string()
            } else {
                binary
            },
            timeout,
            audio,
            max_bytes,
        }
    }

    async fn demux_audio(&self, job: &Job) -> Result<PathBuf, String> {
        let out_path = job.local_path.with_extension("extracted.mp3");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-y")
            .arg("-i")
            .arg(&job.local_path)
            .args(["-vn", "-ac", "1", "-ar", "16000", "-f", "mp3"])
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = tokio::time::timeout(self.timeout, cmd.output()).await;
        let output = match run {
            Err(_elapsed) => return Err("audio demux timed out".to_string()),
            Ok(Err(e)) => return Err(format!("ffmpeg failed to start: {e}")),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), "ffmpeg demux failed");
            return Err(format!(
                "audio demux failed: {}",
                stderr.trim().chars().take(300).collect::<String>()
            ));
        }
        Ok(out_path)
    }
}

#[async_trait]
impl Extractor for VideoExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let audio_path = match self.demux_audio(job).await {
            Ok(p) => p,
            Err(message) => {
                return Ok(ExtractionResult {
                    success: false,
                    method: "transcription".to_string(),
                    file_type: self.name().to_string(),
                    mime_type: job.mime_type.clone(),
                    error: Some(message),
                    ..Default::default()
                })
            }
        };

        let bytes = tokio::fs::read(&audio_path).await?;
        let mut result = self
            .audio
            .transcribe_bytes(job, "audio.mp3", bytes)
            .await;
        result.file_type = self.name().to_string();
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "media/video"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[
            "video/mp4",
            "video/mpeg",
            "video/quicktime",
            "video/webm",
            "video/x-matroska",
            "video/x-msvideo",
        ]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".mp4", ".mov", ".mkv", ".webm", ".avi", ".mpg", ".mpeg", ".m4v"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}
