//! Audio transcription. The artifact is posted to the transcription
//! provider; the `timestamps` option renders timed segments instead of the
//! flat transcript.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::extract::types::{
    bool_option, build_counts, float_option, string_option, ExtractError, ExtractionResult,
    Extractor, Job,
};
use crate::transcribe::{Segment, TranscribeOptions, Transcriber};

pub struct AudioExtractor {
    client: Arc<dyn Transcriber>,
    model: String,
    max_bytes: u64,
}

impl AudioExtractor {
    pub fn new(client: Arc<dyn Transcriber>, model: impl Into<String>, max_bytes: u64) -> Self {
        let model = model.into();
        Self {
            client,
            model: if model.trim().is_empty() {
                "whisper-large-v3-turbo".to_string()
            } else {
                model
            },
            max_bytes,
        }
    }

    /// Transcribe an already-loaded payload. The video extractor reuses this
    /// after demuxing its audio track.
    pub async fn transcribe_bytes(
        &self,
        job: &Job,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ExtractionResult {
        if bytes.is_empty() {
            return self.failure(job, "audio file is empty");
        }

        let options = job.options.as_ref();
        let transcribe_opts = TranscribeOptions {
            model: string_option(options, "model", &self.model),
            language: string_option(options, "language", ""),
            prompt: string_option(options, "prompt", ""),
            temperature: float_option(options, "temperature"),
            response_format: string_option(options, "responseFormat", "verbose_json"),
        };

        let payload = match self
            .client
            .transcribe(file_name, bytes, &transcribe_opts)
            .await
        {
            Ok(p) => p,
            Err(e) => return self.failure(job, &e.to_string()),
        };

        let mut text = payload.text.trim().to_string();
        if bool_option(options, "timestamps", false) && !payload.segments.is_empty() {
            text = format_timestamped_transcript(&payload.segments);
        }
        if text.is_empty() {
            return self.failure(job, "transcription returned empty transcript");
        }

        let (word_count, char_count) = build_counts(&text);
        let mut metadata = HashMap::new();
        if !payload.language.is_empty() {
            metadata.insert("language".to_string(), payload.language.clone());
        }
        if payload.duration > 0.0 {
            metadata.insert(
                "durationSeconds".to_string(),
                format!("{:.3}", payload.duration),
            );
        }
        metadata.insert("model".to_string(), transcribe_opts.model.clone());

        ExtractionResult {
            success: true,
            text,
            method: "transcription".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            metadata: Some(metadata),
            word_count,
            char_count,
            ..Default::default()
        }
    }

    fn failure(&self, job: &Job, message: &str) -> ExtractionResult {
        ExtractionResult {
            success: false,
            method: "transcription".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Extractor for AudioExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let file_name = job
            .local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.bin".to_string());
        Ok(self.transcribe_bytes(job, &file_name, bytes).await)
    }

    fn name(&self) -> &'static str {
        "media/audio"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[
            "audio/mpeg",
            "audio/wav",
            "audio/x-wav",
            "audio/mp4",
            "audio/ogg",
            "audio/flac",
            "audio/aac",
            "audio/opus",
        ]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".mp3", ".wav", ".m4a", ".ogg", ".flac", ".aac", ".wma", ".opus",
        ]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

fn format_timestamped_transcript(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|seg| {
            let text = seg.text.trim();
            if text.is_empty() {
                None
            } else {
                Some(format!("[{}] {}", format_timecode(seg.start), text))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_timecode(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecodes_render_minutes_and_hours() {
        assert_eq!(format_timecode(0.0), "00:00");
        assert_eq!(format_timecode(65.4), "01:05");
        assert_eq!(format_timecode(3675.0), "01:01:15");
        assert_eq!(format_timecode(-3.0), "00:00");
    }

    #[test]
    fn timestamped_transcript_skips_empty_segments() {
        let segments = vec![
            Segment {
                start: 0.0,
                end: 1.0,
                text: " hello ".to_string(),
            },
            Segment {
                start: 1.0,
                end: 2.0,
                text: "   ".to_string(),
            },
            Segment {
                start: 61.0,
                end: 62.0,
                text: "world".to_string(),
            },
        ];
        assert_eq!(
            format_timestamped_transcript(&segments),
            "[00:00] hello\n\n[01:01] world"
        );
    }
}
