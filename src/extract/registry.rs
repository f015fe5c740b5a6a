//! Registry of format extractors, indexed by MIME type and by file
//! extension. Registrations happen once at startup; the registry is
//! read-only afterward, so resolution needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{ExtractError, Extractor};

#[derive(Default)]
pub struct Registry {
    by_mime: HashMap<String, Arc<dyn Extractor>>,
    by_extension: HashMap<String, Arc<dyn Extractor>>,
    extractors: Vec<Arc<dyn Extractor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor under all of its MIME types and extensions.
    /// Keys are normalized to lowercase; a later registration of the same
    /// key overwrites the earlier one (registration order is deterministic).
    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) {
        self.register_arc(Arc::new(extractor));
    }

    /// Register an extractor that is shared with other components.
    pub fn register_arc(&mut self, extractor: Arc<dyn Extractor>) {
        for mime in extractor.supported_types() {
            let key = mime.trim().to_lowercase();
            if !key.is_empty() {
                self.by_mime.insert(key, extractor.clone());
            }
        }
        for ext in extractor.supported_extensions() {
            let key = ext.trim().to_lowercase();
            if !key.is_empty() {
                self.by_extension.insert(key, extractor.clone());
            }
        }
        self.extractors.push(extractor);
    }

    /// Resolve `(mime, extension)` to a single extractor.
    ///
    /// Precedence: exact extension, exact MIME, MIME with parameters
    /// stripped, then any `text/*` falls back to the plain-text extractor.
    /// Extension beats MIME because uploads routinely sniff as a generic
    /// `text/plain` even for source code.
    pub fn resolve(
        &self,
        mime_type: &str,
        extension: &str,
    ) -> Result<Arc<dyn Extractor>, ExtractError> {
        let mime = mime_type.trim().to_lowercase();
        let ext = extension.trim().to_lowercase();

        if let Some(e) = self.by_extension.get(&ext) {
            return Ok(e.clone());
        }

        if let Some(e) = self.by_mime.get(&mime) {
            return Ok(e.clone());
        }

        if let Some(idx) = mime.find(';') {
            if idx > 0 {
                if let Some(e) = self.by_mime.get(mime[..idx].trim()) {
                    return Ok(e.clone());
                }
            }
        }

        if mime.starts_with("text/") {
            if let Some(e) = self.by_mime.get("text/plain") {
                return Ok(e.clone());
            }
        }

        Err(ExtractError::NoExtractor {
            mime: mime_type.to_string(),
            extension: extension.to_string(),
        })
    }

    pub fn extractors(&self) -> impl Iterator<Item = &Arc<dyn Extractor>> {
        self.extractors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::types::{ExtractionResult, Job};
    use async_trait::async_trait;

    struct StubExtractor {
        name: &'static str,
        types: &'static [&'static str],
        exts: &'static [&'static str],
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self, _job: &Job) -> Result<ExtractionResult, ExtractError> {
            Ok(ExtractionResult {
                success: true,
                file_type: self.name.to_string(),
                ..Default::default()
            })
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn supported_types(&self) -> &'static [&'static str] {
            self.types
        }
        fn supported_extensions(&self) -> &'static [&'static str] {
            self.exts
        }
        fn max_file_size(&self) -> u64 {
            0
        }
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(StubExtractor {
            name: "text",
            types: &["text/plain", "text/markdown"],
            exts: &[".txt", ".md"],
        });
        r.register(StubExtractor {
            name: "code",
            types: &[],
            exts: &[".go", ".rs"],
        });
        r.register(StubExtractor {
            name: "pdf",
            types: &["application/pdf"],
            exts: &[".pdf"],
        });
        r
    }

    #[test]
    fn extension_beats_mime() {
        let r = registry();
        let e = r.resolve("text/plain", ".go").unwrap();
        assert_eq!(e.name(), "code");
    }

    #[test]
    fn exact_mime_match() {
        let r = registry();
        assert_eq!(r.resolve("application/pdf", ".bin").unwrap().name(), "pdf");
    }

    #[test]
    fn mime_parameters_are_stripped() {
        let r = registry();
        let e = r.resolve("application/pdf; version=1.7", ".bin").unwrap();
        assert_eq!(e.name(), "pdf");
    }

    #[test]
    fn text_star_falls_back_to_plaintext() {
        let r = registry();
        assert_eq!(r.resolve("text/x-unknown", ".xyz").unwrap().name(), "text");
    }

    #[test]
    fn unknown_pair_fails() {
        let r = registry();
        assert!(matches!(
            r.resolve("application/octet-stream", ".xyz"),
            Err(ExtractError::NoExtractor { .. })
        ));
    }

    #[test]
    fn keys_are_case_insensitive() {
        let r = registry();
        assert_eq!(r.resolve("Application/PDF", ".PDF").unwrap().name(), "pdf");
    }

    #[test]
    fn later_registration_overwrites() {
        let mut r = registry();
        r.register(StubExtractor {
            name: "text2",
            types: &["text/plain"],
            exts: &[],
        });
        assert_eq!(r.resolve("text/plain", "").unwrap().name(), "text2");
    }
}
