//! Per-page text quality scoring.
//!
//! Decides whether a page's text layer is trustworthy or the page should be
//! flagged for OCR. Deliberately permissive: OCR costs money per page, so a
//! page is flagged only when it is nearly empty or its content is dominated
//! by non-letter/digit glyphs (typical of vector-rendered or glyphless
//! pages).

use crate::extract::types::build_counts;

/// Share of letter/digit characters (among non-whitespace) below which a
/// page is considered glyph garbage.
const MIN_ALNUM_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityDecision {
    pub word_count: usize,
    pub needs_ocr: bool,
}

pub fn score(text: &str, min_words: usize) -> QualityDecision {
    let (word_count, _) = build_counts(text);

    if word_count < min_words {
        return QualityDecision {
            word_count,
            needs_ocr: true,
        };
    }

    QualityDecision {
        word_count,
        needs_ocr: !is_mostly_alphanumeric(text),
    }
}

fn is_mostly_alphanumeric(text: &str) -> bool {
    let mut letters = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if c.is_alphanumeric() {
            letters += 1;
        }
    }
    if total == 0 {
        return false;
    }
    letters as f64 / total as f64 >= MIN_ALNUM_RATIO
}
