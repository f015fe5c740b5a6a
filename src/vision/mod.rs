//! Vision classification of images via an OpenRouter chat-completions
//! endpoint. One cheap call decides whether an image is text, visual, or
//! mixed content; the structured-output JSON schema pins the response shape
//! so the prompt stays short.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

const MAX_RETRIES: usize = 1;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MODEL: &str = "google/gemma-3-27b-it";
const MAX_RESPONSE_BYTES: usize = 1 << 20;

const CLASSIFICATION_PROMPT: &str = r#"Analyze this image. Respond ONLY with the requested JSON.

"contentType" rules:
- "text": The image contains readable text as its primary content - handwritten notes, printed documents, screenshots of text, whiteboards, receipts, code, sticky notes, signs. The user likely wants the text itself.
- "visual": The image is primarily visual - photos, artwork, illustrations, product images. Text is absent or incidental (a watermark, a tiny label).
- "mixed": Significant text AND significant visual content - annotated diagrams, charts with data, infographics, labeled maps.

"imageType": Pick the single best label from: handwriting, document, screenshot, whiteboard, photo, diagram, chart, artwork, meme, other.

"description": Describe what the image contains in detail. Be specific: subjects, objects, context, visual style, and note what topics any visible text covers (but do NOT transcribe it). This description will be used for search indexing - be thorough and factual."#;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision API key not configured")]
    NotConfigured,

    #[error("image URL required")]
    MissingUrl,

    #[error("vision provider returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("vision request failed: {0}")]
    Request(String),

    #[error("decode vision response: {0}")]
    Decode(String),

    #[error("vision classification failed after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
}

impl VisionError {
    fn is_client_error(&self) -> bool {
        matches!(self, VisionError::Api { status, .. } if (400..500).contains(status))
    }
}

/// Structured output of the classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionResult {
    /// "text" | "visual" | "mixed"
    #[serde(default)]
    pub content_type: String,
    /// "handwriting" | "document" | "screenshot" | ... | "other"
    #[serde(default)]
    pub image_type: String,
    pub description: String,
}

#[async_trait]
pub trait VisionClassifier: Send + Sync {
    async fn classify(&self, image_url: &str, model: &str) -> Result<VisionResult, VisionError>;
}

pub struct OpenRouterVision {
    api_key: String,
    api_url: String,
    timeout: Duration,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl OpenRouterVision {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("textmill/1.0")
            .build()
            .expect("Failed to build vision HTTP client");
        Self {
            api_key: api_key.into(),
            api_url: api_url.into(),
            timeout,
            retry_delay: DEFAULT_RETRY_DELAY,
            client,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn execute(&self, body: &serde_json::Value) -> Result<VisionResult, VisionError> {
        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;
        let bytes = &bytes[..bytes.len().min(MAX_RESPONSE_BYTES)];

        if !(200..300).contains(&status) {
            return Err(parse_error_body(status, bytes));
        }

        let completion: ChatCompletionResponse =
            serde_json::from_slice(bytes).map_err(|e| VisionError::Decode(e.to_string()))?;

        // The provider can return 200 with an inline error object.
        if let Some(err) = completion.error {
            if !err.message.is_empty() {
                return Err(VisionError::Api {
                    status,
                    code: err.code,
                    message: err.message,
                });
            }
        }

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(VisionError::Decode("empty content in response".to_string()));
        }

        let mut result: VisionResult = serde_json::from_str(&content)
            .map_err(|e| VisionError::Decode(format!("structured output: {e}")))?;

        // Safe defaults: never accidentally skip OCR.
        if result.content_type.is_empty() {
            result.content_type = "visual".to_string();
        }
        if result.image_type.is_empty() {
            result.image_type = "other".to_string();
        }
        Ok(result)
    }
}

#[async_trait]
impl VisionClassifier for OpenRouterVision {
    async fn classify(&self, image_url: &str, model: &str) -> Result<VisionResult, VisionError> {
        if self.api_key.trim().is_empty() {
            return Err(VisionError::NotConfigured);
        }
        if image_url.trim().is_empty() {
            return Err(VisionError::MissingUrl);
        }
        let model = if model.is_empty() { DEFAULT_MODEL } else { model };

        let body = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": image_url } },
                    { "type": "text", "text": CLASSIFICATION_PROMPT },
                ],
            }],
            "response_format": classification_schema(),
            "temperature": 0.0,
        });

        let mut last: Option<VisionError> = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt as u32).await;
            }
            match self.execute(&body).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let terminal = e.is_client_error();
                    warn!(attempt, error = %e, "vision attempt failed");
                    last = Some(e);
                    if terminal {
                        break;
                    }
                }
            }
        }

        Err(VisionError::Exhausted {
            attempts: MAX_RETRIES + 1,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

fn classification_schema() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "image_classification",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "contentType": {
                        "type": "string",
                        "description": "Whether the image is primarily text, visual, or mixed content",
                        "enum": ["text", "visual", "mixed"],
                    },
                    "imageType": {
                        "type": "string",
                        "description": "The best single-word label for the image type",
                        "enum": ["handwriting", "document", "screenshot", "whiteboard", "photo", "diagram", "chart", "artwork", "meme", "other"],
                    },
                    "description": {
                        "type": "string",
                        "description": "Detailed description of the image for search indexing",
                    },
                },
                "required": ["contentType", "imageType", "description"],
                "additionalProperties": false,
            },
        },
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<InlineError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct InlineError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn parse_error_body(status: u16, bytes: &[u8]) -> VisionError {
    #[derive(Deserialize)]
    struct ErrBody {
        #[serde(default)]
        error: ErrDetail,
    }
    #[derive(Default, Deserialize)]
    struct ErrDetail {
        #[serde(default)]
        code: String,
        #[serde(default)]
        message: String,
    }

    if let Ok(parsed) = serde_json::from_slice::<ErrBody>(bytes) {
        if !parsed.error.message.is_empty() {
            return VisionError::Api {
                status,
                code: parsed.error.code,
                message: parsed.error.message,
            };
        }
    }

    let mut message = String::from_utf8_lossy(bytes).into_owned();
    if message.len() > 500 {
        message.truncate(500);
    }
    VisionError::Api {
        status,
        code: "unknown".to_string(),
        message,
    }
}
