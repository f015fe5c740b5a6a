//! Configuration handling for the service.
//!
//! Every tunable comes from the environment with a development default: byte
//! caps, concurrency caps, per-subsystem timeouts, rate-limiter parameters,
//! and the hybrid extraction defaults that request options may override per
//! call. The loaded `Config` is frozen after startup.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Environment variable names. Public so tests and deployment tooling can
/// refer to them.
pub const ENV_PORT: &str = "PORT";
pub const ENV_INTERNAL_SHARED_SECRET: &str = "INTERNAL_SHARED_SECRET";
pub const ENV_MISTRAL_API_KEY: &str = "MISTRAL_API_KEY";
pub const ENV_MISTRAL_API_URL: &str = "MISTRAL_API_URL";
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_OPENROUTER_API_URL: &str = "OPENROUTER_API_URL";
pub const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_GROQ_API_URL: &str = "GROQ_API_URL";
pub const ENV_GROQ_MODEL: &str = "GROQ_MODEL";

pub const ENV_MAX_JSON_BODY_BYTES: &str = "MAX_JSON_BODY_BYTES";
pub const ENV_MAX_PDF_BYTES: &str = "MAX_PDF_BYTES";
pub const ENV_MAX_FILE_BYTES: &str = "MAX_FILE_BYTES";
pub const ENV_MAX_AUDIO_BYTES: &str = "MAX_AUDIO_BYTES";
pub const ENV_MAX_VIDEO_BYTES: &str = "MAX_VIDEO_BYTES";
pub const ENV_MAX_CODE_FILE_BYTES: &str = "MAX_CODE_FILE_BYTES";
pub const ENV_MAX_IMAGE_BYTES: &str = "MAX_IMAGE_BYTES";

pub const ENV_MAX_CONCURRENT_REQUESTS: &str = "MAX_CONCURRENT_REQUESTS";
pub const ENV_MAX_OCR_CONCURRENT: &str = "MAX_OCR_CONCURRENT";
pub const ENV_MAX_PAGE_WORKERS: &str = "MAX_PAGE_WORKERS";

pub const ENV_UNIVERSAL_EXTRACT_TIMEOUT: &str = "UNIVERSAL_EXTRACT_TIMEOUT";
pub const ENV_DOWNLOAD_TIMEOUT: &str = "DOWNLOAD_TIMEOUT";
pub const ENV_PDFINFO_TIMEOUT: &str = "PDFINFO_TIMEOUT";
pub const ENV_PDFTOTEXT_TIMEOUT: &str = "PDFTOTEXT_TIMEOUT";
pub const ENV_PDFTOTEXT_ALL_TIMEOUT: &str = "PDFTOTEXT_ALL_TIMEOUT";
pub const ENV_OCR_TIMEOUT: &str = "OCR_TIMEOUT";
pub const ENV_GROQ_TIMEOUT: &str = "GROQ_TIMEOUT";
pub const ENV_VISION_REQUEST_TIMEOUT: &str = "VISION_REQUEST_TIMEOUT";
pub const ENV_LIBREOFFICE_TIMEOUT: &str = "LIBREOFFICE_TIMEOUT";
pub const ENV_FFMPEG_TIMEOUT: &str = "FFMPEG_TIMEOUT";

pub const ENV_RATE_LIMIT_EVERY: &str = "RATE_LIMIT_EVERY";
pub const ENV_RATE_LIMIT_BURST: &str = "RATE_LIMIT_BURST";
pub const ENV_CLEANUP_INTERVAL: &str = "CLEANUP_INTERVAL";
pub const ENV_HEALTH_DEGRADE_RATIO: &str = "HEALTH_DEGRADE_RATIO";

pub const ENV_DEFAULT_MIN_WORDS: &str = "DEFAULT_MIN_WORDS";
pub const ENV_DEFAULT_OCR_TRIGGER_RATIO: &str = "DEFAULT_OCR_TRIGGER_RATIO";
pub const ENV_DEFAULT_PAGE_SEPARATOR: &str = "DEFAULT_PAGE_SEPARATOR";
pub const ENV_DEFAULT_OCR_MODEL: &str = "DEFAULT_OCR_MODEL";
pub const ENV_DEFAULT_VISION_MODEL: &str = "DEFAULT_VISION_MODEL";
pub const ENV_DEFAULT_PREVIEW_PAGES: &str = "DEFAULT_PREVIEW_PAGES";
pub const ENV_DEFAULT_PREVIEW_CHARS: &str = "DEFAULT_PREVIEW_CHARS";
pub const ENV_DEFAULT_PREVIEW_NEEDS_OCR_RATIO: &str = "DEFAULT_PREVIEW_NEEDS_OCR_RATIO";

pub const ENV_LIBREOFFICE_BINARY: &str = "LIBREOFFICE_BINARY";
pub const ENV_FFMPEG_BINARY: &str = "FFMPEG_BINARY";
pub const ENV_ALLOW_PRIVATE_DOWNLOAD_URLS: &str = "ALLOW_PRIVATE_DOWNLOAD_URLS";

/// Runtime configuration, frozen after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the server binds to.
    pub port: u16,

    /// Shared secret required in `X-Internal-Auth` on protected endpoints.
    pub internal_shared_secret: String,
    pub mistral_api_key: String,
    pub mistral_api_url: String,
    pub openrouter_api_key: String,
    pub openrouter_api_url: String,
    pub groq_api_key: String,
    pub groq_api_url: String,
    pub groq_model: String,

    // Byte caps.
    pub max_json_body_bytes: u64,
    pub max_pdf_bytes: u64,
    pub max_file_bytes: u64,
    pub max_audio_bytes: u64,
    pub max_video_bytes: u64,
    pub max_code_file_bytes: u64,
    pub max_image_bytes: u64,

    // Concurrency caps.
    pub max_concurrent_requests: usize,
    pub max_ocr_concurrent: usize,
    /// Per-document cap on page-extraction workers.
    pub max_page_workers: usize,

    // Deadlines.
    pub universal_extract_timeout: Duration,
    pub download_timeout: Duration,
    pub pdfinfo_timeout: Duration,
    pub pdftotext_timeout: Duration,
    pub pdftotext_all_timeout: Duration,
    pub ocr_timeout: Duration,
    pub groq_timeout: Duration,
    pub vision_request_timeout: Duration,
    pub libreoffice_timeout: Duration,
    pub ffmpeg_timeout: Duration,

    // Per-client rate limiting.
    pub rate_limit_every: Duration,
    pub rate_limit_burst: u32,
    /// How often the limiter map is rebuilt from scratch.
    pub cleanup_interval: Duration,

    pub health_degrade_ratio: f64,

    // Hybrid extraction defaults, used when request options omit values.
    pub default_min_words_threshold: usize,
    pub default_ocr_trigger_ratio: f64,
    pub default_page_separator: String,
    pub default_ocr_model: String,
    pub default_vision_model: String,
    pub default_preview_max_pages: usize,
    pub default_preview_max_chars: usize,
    pub default_preview_needs_ocr_ratio: f64,

    // Conversion binaries.
    pub libreoffice_binary: String,
    pub ffmpeg_binary: String,

    /// Operator toggle: allow http/private download targets (dev only).
    pub allow_private_download_urls: bool,
}

impl Config {
    /// Load from environment variables, falling back to development defaults.
    pub fn from_env() -> Self {
        Self {
            port: env_u64(ENV_PORT, 8080) as u16,

            internal_shared_secret: env_str(ENV_INTERNAL_SHARED_SECRET, ""),
            mistral_api_key: env_str(ENV_MISTRAL_API_KEY, ""),
            mistral_api_url: env_str(ENV_MISTRAL_API_URL, "https://api.mistral.ai/v1/ocr"),
            openrouter_api_key: env_str(ENV_OPENROUTER_API_KEY, ""),
            openrouter_api_url: env_str(
                ENV_OPENROUTER_API_URL,
                "https://openrouter.ai/api/v1/chat/completions",
            ),
            groq_api_key: env_str(ENV_GROQ_API_KEY, ""),
            groq_api_url: env_str(
                ENV_GROQ_API_URL,
                "https://api.groq.com/openai/v1/audio/transcriptions",
            ),
            groq_model: env_str(ENV_GROQ_MODEL, "whisper-large-v3-turbo"),

            max_json_body_bytes: env_u64(ENV_MAX_JSON_BODY_BYTES, 2 << 20),
            max_pdf_bytes: env_u64(ENV_MAX_PDF_BYTES, 200 << 20),
            max_file_bytes: env_u64(ENV_MAX_FILE_BYTES, 500 << 20),
            max_audio_bytes: env_u64(ENV_MAX_AUDIO_BYTES, 100 << 20),
            max_video_bytes: env_u64(ENV_MAX_VIDEO_BYTES, 500 << 20),
            max_code_file_bytes: env_u64(ENV_MAX_CODE_FILE_BYTES, 10 << 20),
            max_image_bytes: env_u64(ENV_MAX_IMAGE_BYTES, 40 << 20),

            max_concurrent_requests: env_usize(ENV_MAX_CONCURRENT_REQUESTS, 15),
            max_ocr_concurrent: env_usize(ENV_MAX_OCR_CONCURRENT, 3),
            max_page_workers: env_usize(ENV_MAX_PAGE_WORKERS, 8),

            universal_extract_timeout: env_duration(
                ENV_UNIVERSAL_EXTRACT_TIMEOUT,
                Duration::from_secs(300),
            ),
            download_timeout: env_duration(ENV_DOWNLOAD_TIMEOUT, Duration::from_secs(25)),
            pdfinfo_timeout: env_duration(ENV_PDFINFO_TIMEOUT, Duration::from_secs(3)),
            pdftotext_timeout: env_duration(ENV_PDFTOTEXT_TIMEOUT, Duration::from_secs(10)),
            pdftotext_all_timeout: env_duration(ENV_PDFTOTEXT_ALL_TIMEOUT, Duration::from_secs(30)),
            ocr_timeout: env_duration(ENV_OCR_TIMEOUT, Duration::from_secs(120)),
            groq_timeout: env_duration(ENV_GROQ_TIMEOUT, Duration::from_secs(120)),
            vision_request_timeout: env_duration(
                ENV_VISION_REQUEST_TIMEOUT,
                Duration::from_secs(30),
            ),
            libreoffice_timeout: env_duration(ENV_LIBREOFFICE_TIMEOUT, Duration::from_secs(60)),
            ffmpeg_timeout: env_duration(ENV_FFMPEG_TIMEOUT, Duration::from_secs(120)),

            rate_limit_every: env_duration(ENV_RATE_LIMIT_EVERY, Duration::from_millis(600)),
            rate_limit_burst: env_u64(ENV_RATE_LIMIT_BURST, 20) as u32,
            cleanup_interval: env_duration(ENV_CLEANUP_INTERVAL, Duration::from_secs(300)),

            health_degrade_ratio: env_f64(ENV_HEALTH_DEGRADE_RATIO, 0.9),

            default_min_words_threshold: env_usize(ENV_DEFAULT_MIN_WORDS, 20),
            default_ocr_trigger_ratio: env_f64(ENV_DEFAULT_OCR_TRIGGER_RATIO, 0.25),
            default_page_separator: env_str(ENV_DEFAULT_PAGE_SEPARATOR, "\n\n---\n\n"),
            default_ocr_model: env_str(ENV_DEFAULT_OCR_MODEL, "mistral-ocr-latest"),
            default_vision_model: env_str(
                ENV_DEFAULT_VISION_MODEL,
                "mistralai/mistral-small-3.1-24b-instruct",
            ),
            default_preview_max_pages: env_usize(ENV_DEFAULT_PREVIEW_PAGES, 8),
            default_preview_max_chars: env_usize(ENV_DEFAULT_PREVIEW_CHARS, 20_000),
            default_preview_needs_ocr_ratio: env_f64(ENV_DEFAULT_PREVIEW_NEEDS_OCR_RATIO, 0.25),

            libreoffice_binary: env_str(ENV_LIBREOFFICE_BINARY, "soffice"),
            ffmpeg_binary: env_str(ENV_FFMPEG_BINARY, "ffmpeg"),

            allow_private_download_urls: env_bool(ENV_ALLOW_PRIVATE_DOWNLOAD_URLS, false),
        }
    }

    /// Reject configurations that would run the service without real
    /// authentication.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_shared_secret.trim().len() < 32 {
            return Err(ConfigError::InvalidValue {
                field: ENV_INTERNAL_SHARED_SECRET,
                reason: "must be at least 32 characters".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl Error for ConfigError {}

fn env_str(key: &str, fallback: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_u64(key: &str, fallback: u64) -> u64 {
    match env::var(key).ok().and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(n) if n > 0 => n,
        _ => fallback,
    }
}

fn env_usize(key: &str, fallback: usize) -> usize {
    env_u64(key, fallback as u64) as usize
}

fn env_f64(key: &str, fallback: f64) -> f64 {
    match env::var(key).ok().and_then(|v| v.trim().parse::<f64>().ok()) {
        Some(f) if f > 0.0 => f,
        _ => fallback,
    }
}

/// Durations are whole seconds (`25`, `25s`) or milliseconds (`600ms`).
fn env_duration(key: &str, fallback: Duration) -> Duration {
    let raw = match env::var(key) {
        Ok(v) => v.trim().to_string(),
        Err(_) => return fallback,
    };
    if raw.is_empty() {
        return fallback;
    }
    if let Some(ms) = raw.strip_suffix("ms") {
        if let Ok(n) = ms.trim().parse::<u64>() {
            if n > 0 {
                return Duration::from_millis(n);
            }
        }
        return fallback;
    }
    let secs = raw.strip_suffix('s').unwrap_or(&raw);
    match secs.trim().parse::<u64>() {
        Ok(n) if n > 0 => Duration::from_secs(n),
        _ => fallback,
    }
}

fn env_bool(key: &str, fallback: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Ensure environment-variable manipulating tests run serially.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            ENV_PORT,
            ENV_MAX_PDF_BYTES,
            ENV_MAX_CONCURRENT_REQUESTS,
            ENV_RATE_LIMIT_EVERY,
            ENV_DEFAULT_OCR_TRIGGER_RATIO,
            ENV_DEFAULT_PAGE_SEPARATOR,
            ENV_ALLOW_PRIVATE_DOWNLOAD_URLS,
            ENV_PDFINFO_TIMEOUT,
            ENV_INTERNAL_SHARED_SECRET,
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_when_env_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_pdf_bytes, 200 << 20);
        assert_eq!(cfg.max_concurrent_requests, 15);
        assert_eq!(cfg.rate_limit_every, Duration::from_millis(600));
        assert_eq!(cfg.default_ocr_trigger_ratio, 0.25);
        assert_eq!(cfg.default_page_separator, "\n\n---\n\n");
        assert_eq!(cfg.pdfinfo_timeout, Duration::from_secs(3));
        assert!(!cfg.allow_private_download_urls);
    }

    #[test]
    fn overrides_when_env_present() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var(ENV_PORT, "9090");
        std::env::set_var(ENV_MAX_CONCURRENT_REQUESTS, "4");
        std::env::set_var(ENV_RATE_LIMIT_EVERY, "250ms");
        std::env::set_var(ENV_PDFINFO_TIMEOUT, "7s");
        std::env::set_var(ENV_ALLOW_PRIVATE_DOWNLOAD_URLS, "true");
        let cfg = Config::from_env();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.max_concurrent_requests, 4);
        assert_eq!(cfg.rate_limit_every, Duration::from_millis(250));
        assert_eq!(cfg.pdfinfo_timeout, Duration::from_secs(7));
        assert!(cfg.allow_private_download_urls);
        clear_env();
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var(ENV_MAX_CONCURRENT_REQUESTS, "not-a-number");
        std::env::set_var(ENV_DEFAULT_OCR_TRIGGER_RATIO, "-1");
        let cfg = Config::from_env();
        assert_eq!(cfg.max_concurrent_requests, 15);
        assert_eq!(cfg.default_ocr_trigger_ratio, 0.25);
        clear_env();
    }

    #[test]
    fn validate_requires_long_secret() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let mut cfg = Config::from_env();
        assert!(cfg.validate().is_err());
        cfg.internal_shared_secret = "x".repeat(32);
        assert!(cfg.validate().is_ok());
    }
}
