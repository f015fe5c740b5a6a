//! Audio transcription via a whisper-compatible endpoint (Groq). The file is
//! posted as multipart form data; `verbose_json` responses carry timed
//! segments used for optional timestamped transcripts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const MAX_ERROR_BODY_BYTES: usize = 64 << 10;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("transcription API key not configured")]
    NotConfigured,

    #[error("transcription provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transcription request failed: {0}")]
    Request(String),

    #[error("decode transcription response: {0}")]
    Decode(String),
}

/// Request knobs forwarded to the provider.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    pub model: String,
    pub language: String,
    pub prompt: String,
    pub temperature: Option<f64>,
    pub response_format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Provider response (verbose_json).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub duration: f64,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        options: &TranscribeOptions,
    ) -> Result<Transcription, TranscribeError>;
}

pub struct GroqTranscriber {
    api_key: String,
    api_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GroqTranscriber {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("textmill/1.0")
            .build()
            .expect("Failed to build transcription HTTP client");
        Self {
            api_key: api_key.into(),
            api_url: api_url.into(),
            timeout,
            client,
        }
    }
}

#[async_trait]
impl Transcriber for GroqTranscriber {
    async fn transcribe(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        options: &TranscribeOptions,
    ) -> Result<Transcription, TranscribeError> {
        if self.api_key.trim().is_empty() {
            return Err(TranscribeError::NotConfigured);
        }

        let response_format = if options.response_format.is_empty() {
            "verbose_json".to_string()
        } else {
            options.response_format.clone()
        };

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| TranscribeError::Request(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", options.model.clone())
            .text("response_format", response_format);
        if !options.language.is_empty() {
            form = form.text("language", options.language.clone());
        }
        if !options.prompt.is_empty() {
            form = form.text("prompt", options.prompt.clone());
        }
        if let Some(temperature) = options.temperature {
            form = form.text("temperature", temperature.to_string());
        }

        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscribeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let mut message = String::from_utf8_lossy(&body[..body.len().min(MAX_ERROR_BODY_BYTES)])
                .into_owned();
            if message.len() > 500 {
                message.truncate(500);
            }
            return Err(TranscribeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Transcription>()
            .await
            .map_err(|e| TranscribeError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_json_deserializes() {
        let raw = r#"{
            "text": "hello there",
            "segments": [
                {"start": 0.0, "end": 1.2, "text": "hello"},
                {"start": 1.2, "end": 2.0, "text": "there"}
            ],
            "language": "en",
            "duration": 2.0
        }"#;
        let t: Transcription = serde_json::from_str(raw).unwrap();
        assert_eq!(t.text, "hello there");
        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.language, "en");
    }

    #[test]
    fn missing_fields_default() {
        let t: Transcription = serde_json::from_str(r#"{"text": "x"}"#).unwrap();
        assert!(t.segments.is_empty());
        assert_eq!(t.duration, 0.0);
    }
}
