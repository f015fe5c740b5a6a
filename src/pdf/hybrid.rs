//! The hybrid PDF engine: cheap text-layer extraction first, OCR only for
//! the pages that fail the quality check.
//!
//! Phases: count → plan → parallel text-layer → trigger decision → OCR →
//! merge → assemble. OCR is a merge step over an accumulator, never a
//! prerequisite: if the OCR call fails, the text-layer pages survive and the
//! error is attached to the result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::config::Config;
use crate::extract::clean::clean_text;
use crate::extract::types::{
    bool_option, build_counts, float_option, int_option, pages_option, string_option, PageMethod,
    PageResult,
};
use crate::ocr::{OcrEngine, OcrError};
use crate::pdf::poppler::PageSource;
use crate::pdf::quality;

/// Per-request knobs, filled from request options with configuration
/// defaults.
#[derive(Debug, Clone)]
pub struct HybridOptions {
    pub min_words_threshold: usize,
    /// Flagged-page fraction at or above which the whole document is OCR'd
    /// in a single call.
    pub ocr_trigger_ratio: f64,
    pub page_separator: String,
    pub ocr_model: String,
    pub include_page_numbers: bool,
    /// Explicit one-based page plan; empty means every page.
    pub pages: Vec<usize>,
    pub extract_header: bool,
    pub extract_footer: bool,
    pub preview_max_pages: usize,
    pub preview_max_chars: usize,
    pub needs_ocr_ratio: f64,
}

/// Result of a full hybrid extraction, before normalization into the
/// unified result shape.
#[derive(Debug, Clone, Default)]
pub struct HybridResult {
    pub success: bool,
    pub text: String,
    pub pages: Vec<PageResult>,
    pub total_pages: usize,
    pub text_layer_pages: usize,
    pub ocr_pages: usize,
    pub cost_savings_percent: u64,
    pub error: Option<String>,
}

/// Result of the OCR-free preview path.
#[derive(Debug, Clone, Default)]
pub struct PreviewResult {
    pub success: bool,
    pub text: String,
    pub total_pages: usize,
    pub text_layer_pages: usize,
    pub word_count: usize,
    pub needs_ocr: bool,
    pub error: Option<String>,
}

pub struct HybridProcessor {
    config: Arc<Config>,
    pages: Arc<dyn PageSource>,
    ocr: Arc<dyn OcrEngine>,
}

impl HybridProcessor {
    pub fn new(config: Arc<Config>, pages: Arc<dyn PageSource>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { config, pages, ocr }
    }

    /// Build options from a request's free-form options map, falling back to
    /// server defaults for anything omitted or invalid.
    pub fn options_from(&self, options: Option<&serde_json::Map<String, Value>>) -> HybridOptions {
        let cfg = &self.config;
        HybridOptions {
            min_words_threshold: int_option(
                options,
                "minWordsThreshold",
                cfg.default_min_words_threshold,
            ),
            ocr_trigger_ratio: float_option(options, "ocrTriggerRatio")
                .filter(|r| *r > 0.0)
                .unwrap_or(cfg.default_ocr_trigger_ratio),
            page_separator: string_option(options, "pageSeparator", &cfg.default_page_separator),
            ocr_model: string_option(options, "ocrModel", &cfg.default_ocr_model),
            include_page_numbers: bool_option(options, "includePageNumbers", false),
            pages: pages_option(options, "pages"),
            extract_header: bool_option(options, "extractHeader", false),
            extract_footer: bool_option(options, "extractFooter", false),
            preview_max_pages: int_option(options, "previewMaxPages", cfg.default_preview_max_pages),
            preview_max_chars: int_option(options, "previewMaxChars", cfg.default_preview_max_chars),
            needs_ocr_ratio: float_option(options, "needsOcrRatio")
                .filter(|r| *r > 0.0)
                .unwrap_or(cfg.default_preview_needs_ocr_ratio),
        }
    }

    /// Full extraction: text layer for every planned page, OCR for the pages
    /// that need it (or the whole document past the trigger ratio).
    pub async fn process(
        &self,
        presigned_url: &str,
        pdf_path: &Path,
        opts: &HybridOptions,
    ) -> HybridResult {
        let mut result = HybridResult::default();

        let total_pages = match self.pages.page_count(pdf_path).await {
            Ok(n) => n,
            Err(e) => {
                result.error = Some(format!("page count failed: {e}"));
                return result;
            }
        };
        result.total_pages = total_pages;

        // Phase: plan.
        let planned: Vec<usize> = if opts.pages.is_empty() {
            (1..=total_pages).collect()
        } else {
            opts.pages.clone()
        };

        // Phase 1: parallel text-layer extraction, output in plan order.
        let mut pages = self
            .extract_pages_parallel(pdf_path, &planned, opts.min_words_threshold)
            .await;

        // Phase 2: OCR-trigger decision.
        let flagged: Vec<usize> = pages
            .iter()
            .filter(|p| p.method == PageMethod::NeedsOcr)
            .map(|p| p.page_number)
            .collect();
        let flagged_ratio = flagged.len() as f64 / planned.len() as f64;
        let full_ocr = flagged_ratio >= opts.ocr_trigger_ratio;

        // Phase 3: OCR. Failure degrades to a partial result; the text-layer
        // work is never discarded.
        if !flagged.is_empty() {
            let ocr_plan: &[usize] = if full_ocr { &planned } else { &flagged };
            match self.run_ocr_batch(presigned_url, ocr_plan, opts).await {
                Ok(ocr_pages) => merge_ocr_results(&mut pages, &ocr_pages, full_ocr),
                Err(e) => {
                    warn!(error = %e, "document OCR failed, keeping text-layer partial");
                    result.error = Some(format!("OCR failed: {e}"));
                }
            }
        }

        // Any page still flagged got no OCR text; emit it as text-layer so
        // transient states never leave the pipeline.
        for page in pages.iter_mut() {
            if page.method == PageMethod::NeedsOcr {
                page.method = PageMethod::TextLayer;
            }
        }

        // Phase 5: assemble.
        result.text = combine_pages(&pages, &opts.page_separator, opts.include_page_numbers);
        result.ocr_pages = pages.iter().filter(|p| p.method == PageMethod::Ocr).count();
        result.text_layer_pages = pages.len() - result.ocr_pages;
        result.cost_savings_percent = savings_percent(result.text_layer_pages, total_pages);
        result.pages = pages;
        result.success = result.error.is_none();
        result
    }

    /// Preview: text layer over the first `preview_max_pages` pages only.
    /// Never performs OCR; reports whether a full extraction likely would.
    pub async fn preview(&self, pdf_path: &Path, opts: &HybridOptions) -> PreviewResult {
        let mut result = PreviewResult::default();

        let total_pages = match self.pages.page_count(pdf_path).await {
            Ok(n) => n,
            Err(e) => {
                result.error = Some(format!("page count: {e}"));
                return result;
            }
        };
        result.total_pages = total_pages;

        let preview_pages = opts.preview_max_pages.min(total_pages).max(1);
        let planned: Vec<usize> = (1..=preview_pages).collect();

        let pages = self
            .extract_pages_parallel(pdf_path, &planned, opts.min_words_threshold)
            .await;

        let mut flagged = 0usize;
        let mut parts: Vec<&str> = Vec::new();
        for page in &pages {
            result.word_count += page.word_count;
            if page.method == PageMethod::NeedsOcr {
                flagged += 1;
            } else {
                result.text_layer_pages += 1;
                parts.push(&page.text);
            }
        }

        result.needs_ocr = flagged as f64 / planned.len() as f64 > opts.needs_ocr_ratio;

        let combined = parts.join("\n\n");
        let (text, _truncated) = truncate_chars(&combined, opts.preview_max_chars);
        result.text = text;
        result.success = true;
        result
    }

    async fn extract_pages_parallel(
        &self,
        pdf_path: &Path,
        planned: &[usize],
        min_words: usize,
    ) -> Vec<PageResult> {
        let workers = num_cpus::get()
            .min(self.config.max_page_workers.max(1))
            .min(planned.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut join_set: JoinSet<(usize, PageResult)> = JoinSet::new();
        for (idx, page_number) in planned.iter().copied().enumerate() {
            let semaphore = semaphore.clone();
            let source = self.pages.clone();
            let path: PathBuf = pdf_path.to_path_buf();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    // Gate closed mid-shutdown: flag the page silently.
                    Err(_) => return (idx, placeholder_page(page_number)),
                };
                (
                    idx,
                    extract_single_page(source.as_ref(), &path, page_number, min_words).await,
                )
            });
        }

        // Results land at their planned index, so output order follows the
        // plan regardless of completion order.
        let mut slots: Vec<Option<PageResult>> = vec![None; planned.len()];
        while let Some(joined) = join_set.join_next().await {
            if let Ok((idx, page)) = joined {
                slots[idx] = Some(page);
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| slot.unwrap_or_else(|| placeholder_page(planned[idx])))
            .collect()
    }

    async fn run_ocr_batch(
        &self,
        presigned_url: &str,
        pages: &[usize],
        opts: &HybridOptions,
    ) -> Result<BTreeMap<usize, String>, OcrError> {
        if pages.is_empty() {
            return Ok(BTreeMap::new());
        }

        // The OCR provider is zero-indexed.
        let pages0: Vec<usize> = pages.iter().map(|p| p - 1).collect();
        let response = self
            .ocr
            .ocr_document(
                presigned_url,
                &opts.ocr_model,
                &pages0,
                opts.extract_header,
                opts.extract_footer,
            )
            .await?;

        let mut results = BTreeMap::new();
        for page in response.pages {
            results.insert(page.index + 1, clean_text(&page.markdown));
        }
        Ok(results)
    }
}

fn placeholder_page(page_number: usize) -> PageResult {
    PageResult {
        page_number,
        text: String::new(),
        method: PageMethod::NeedsOcr,
        word_count: 0,
    }
}

async fn extract_single_page(
    source: &dyn PageSource,
    pdf_path: &Path,
    page_number: usize,
    min_words: usize,
) -> PageResult {
    let text = match source.page_text(pdf_path, page_number).await {
        Ok(t) => t,
        Err(_) => return placeholder_page(page_number),
    };

    let text = clean_text(&text);
    let decision = quality::score(&text, min_words);

    PageResult {
        page_number,
        text,
        method: if decision.needs_ocr {
            PageMethod::NeedsOcr
        } else {
            PageMethod::TextLayer
        },
        word_count: decision.word_count,
    }
}

/// Overwrite pages with their OCR text. In full-document mode every covered
/// page is replaced; in partial mode only flagged pages are, so good
/// text-layer pages are never clobbered by an overlapping OCR response.
fn merge_ocr_results(
    pages: &mut [PageResult],
    ocr_results: &BTreeMap<usize, String>,
    full_ocr: bool,
) {
    for page in pages.iter_mut() {
        if let Some(markdown) = ocr_results.get(&page.page_number) {
            if full_ocr || page.method == PageMethod::NeedsOcr {
                page.text = markdown.clone();
                page.method = PageMethod::Ocr;
                page.word_count = build_counts(markdown).0;
            }
        }
    }
}

fn combine_pages(pages: &[PageResult], separator: &str, include_page_numbers: bool) -> String {
    pages
        .iter()
        .map(|p| {
            if include_page_numbers {
                format!("[Page {}]\n{}", p.page_number, p.text)
            } else {
                p.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn savings_percent(text_layer_pages: usize, total_pages: usize) -> u64 {
    if total_pages == 0 {
        return 0;
    }
    (100 * text_layer_pages as u64) / total_pages as u64
}

/// Truncate to `max_chars` code points, appending an ellipsis marker exactly
/// when truncation occurred.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let cut: String = text.chars().take(max_chars).collect();
    (format!("{cut}..."), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, text: &str, method: PageMethod) -> PageResult {
        PageResult {
            page_number: n,
            text: text.to_string(),
            method,
            word_count: build_counts(text).0,
        }
    }

    #[test]
    fn combine_uses_separator() {
        let pages = vec![
            page(1, "A", PageMethod::TextLayer),
            page(2, "B", PageMethod::TextLayer),
            page(3, "C", PageMethod::TextLayer),
        ];
        assert_eq!(combine_pages(&pages, "\n\n---\n\n", false), "A\n\n---\n\nB\n\n---\n\nC");
    }

    #[test]
    fn combine_with_page_markers() {
        let pages = vec![page(1, "A", PageMethod::TextLayer), page(2, "B", PageMethod::Ocr)];
        assert_eq!(
            combine_pages(&pages, "\n", true),
            "[Page 1]\nA\n[Page 2]\nB"
        );
    }

    #[test]
    fn partial_merge_protects_good_pages() {
        let mut pages = vec![
            page(1, "good text layer", PageMethod::TextLayer),
            page(2, "", PageMethod::NeedsOcr),
        ];
        let ocr = BTreeMap::from([
            (1, "ocr one".to_string()),
            (2, "ocr two".to_string()),
        ]);
        merge_ocr_results(&mut pages, &ocr, false);
        assert_eq!(pages[0].text, "good text layer");
        assert_eq!(pages[0].method, PageMethod::TextLayer);
        assert_eq!(pages[1].text, "ocr two");
        assert_eq!(pages[1].method, PageMethod::Ocr);
        assert_eq!(pages[1].word_count, 2);
    }

    #[test]
    fn full_merge_overwrites_everything_covered() {
        let mut pages = vec![
            page(1, "good text layer", PageMethod::TextLayer),
            page(2, "", PageMethod::NeedsOcr),
        ];
        let ocr = BTreeMap::from([(1, "A".to_string()), (2, "B".to_string())]);
        merge_ocr_results(&mut pages, &ocr, true);
        assert_eq!(pages[0].method, PageMethod::Ocr);
        assert_eq!(pages[0].text, "A");
        assert_eq!(pages[1].method, PageMethod::Ocr);
    }

    #[test]
    fn savings_is_floored_integer_percent() {
        assert_eq!(savings_percent(3, 3), 100);
        assert_eq!(savings_percent(0, 3), 0);
        assert_eq!(savings_percent(8, 10), 80);
        assert_eq!(savings_percent(1, 3), 33);
        assert_eq!(savings_percent(2, 3), 66);
        assert_eq!(savings_percent(0, 0), 0);
    }

    #[test]
    fn truncation_appends_marker_only_when_cut() {
        let (t, cut) = truncate_chars("hello", 10);
        assert_eq!((t.as_str(), cut), ("hello", false));

        let (t, cut) = truncate_chars("hello", 5);
        assert_eq!((t.as_str(), cut), ("hello", false));

        let (t, cut) = truncate_chars("hello", 4);
        assert_eq!((t.as_str(), cut), ("hell...", true));

        // code points, not bytes
        let (t, cut) = truncate_chars("héllo", 2);
        assert_eq!((t.as_str(), cut), ("hé...", true));
    }
}
