//! Shared application state: configuration, the extractor registry, the
//! request router, and the resource-governor primitives. Everything here is
//! built once at startup and frozen.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::extract::{self, Registry};
use crate::extractors::{
    AudioExtractor, CsvExtractor, HtmlExtractor, ImageExtractor, JsonExtractor, LatexExtractor,
    NotebookExtractor, OfficeExtractor, PdfExtractor, PlainTextExtractor, SourceExtractor,
    VideoExtractor, XmlExtractor, YamlExtractor,
};
use crate::metrics::Metrics;
use crate::middleware::RateLimit;
use crate::ocr::MistralOcr;
use crate::pdf::poppler::{PopplerConfig, PopplerSource};
use crate::pdf::HybridProcessor;
use crate::transcribe::GroqTranscriber;
use crate::vision::OpenRouterVision;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub router: Arc<extract::Router>,
    pub hybrid: Arc<HybridProcessor>,
    pub rate_limit: RateLimit,
    pub request_semaphore: Arc<Semaphore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // OCR subsystem semaphore: independent of the request gate.
        let ocr_semaphore = Arc::new(Semaphore::new(config.max_ocr_concurrent.max(1)));
        let ocr = Arc::new(MistralOcr::new(
            config.mistral_api_key.clone(),
            config.mistral_api_url.clone(),
            config.ocr_timeout,
            ocr_semaphore,
        ));
        let vision = Arc::new(OpenRouterVision::new(
            config.openrouter_api_key.clone(),
            config.openrouter_api_url.clone(),
            config.vision_request_timeout,
        ));
        let transcriber = Arc::new(GroqTranscriber::new(
            config.groq_api_key.clone(),
            config.groq_api_url.clone(),
            config.groq_timeout,
        ));

        let poppler = Arc::new(PopplerSource::new(PopplerConfig {
            pdfinfo_timeout: config.pdfinfo_timeout,
            pdftotext_timeout: config.pdftotext_timeout,
            pdftotext_all_timeout: config.pdftotext_all_timeout,
        }));
        let hybrid = Arc::new(HybridProcessor::new(
            config.clone(),
            poppler,
            ocr.clone(),
        ));

        let audio = Arc::new(AudioExtractor::new(
            transcriber,
            config.groq_model.clone(),
            config.max_audio_bytes,
        ));

        // Registration order matters: more-specific handlers first, so a
        // later generic registration never steals their keys.
        let mut registry = Registry::new();
        registry.register(PdfExtractor::new(hybrid.clone(), config.max_pdf_bytes));
        registry.register(ImageExtractor::new(
            ocr,
            vision,
            config.default_ocr_model.clone(),
            config.default_vision_model.clone(),
            config.max_image_bytes,
        ));
        registry.register(PlainTextExtractor::new(config.max_code_file_bytes));
        registry.register(HtmlExtractor::new(config.max_code_file_bytes));
        registry.register(CsvExtractor::new(config.max_code_file_bytes));
        registry.register(JsonExtractor::new(config.max_code_file_bytes));
        registry.register(XmlExtractor::new(config.max_code_file_bytes));
        registry.register(YamlExtractor::new(config.max_code_file_bytes));
        registry.register(SourceExtractor::new(config.max_code_file_bytes));
        registry.register(NotebookExtractor::new(config.max_code_file_bytes));
        registry.register(LatexExtractor::new(config.max_code_file_bytes));
        registry.register(OfficeExtractor::new(
            config.libreoffice_binary.clone(),
            config.libreoffice_timeout,
            config.max_file_bytes,
        ));
        registry.register_arc(audio.clone());
        registry.register(VideoExtractor::new(
            config.ffmpeg_binary.clone(),
            config.ffmpeg_timeout,
            audio,
            config.max_video_bytes,
        ));
        let registry = Arc::new(registry);

        let router = Arc::new(extract::Router::new(
            registry.clone(),
            config.max_file_bytes,
            config.download_timeout,
            config.allow_private_download_urls,
        ));

        let rate_limit = RateLimit::new(config.rate_limit_every, config.rate_limit_burst);
        let request_semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        Self {
            config,
            registry,
            router,
            hybrid,
            rate_limit,
            request_semaphore,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
