//! Result normalization: canonical word/char counts and the metadata
//! frontmatter block prepended to extracted text.

use std::collections::HashMap;

use super::types::{build_counts, ExtractionResult};

/// Fixed key ordering for document metadata. Known keys are emitted in this
/// order; any remaining keys follow alphabetically so the block is
/// byte-for-byte stable for a given metadata map.
const CANONICAL_KEYS: &[&str] = &[
    "title",
    "author",
    "subject",
    "description",
    "created",
    "modified",
    "lastModifiedBy",
];

/// Render a YAML-like frontmatter block: `---\nkey: value\n---\n\n`.
/// Returns an empty string for an empty map.
pub fn frontmatter(metadata: &HashMap<String, String>) -> String {
    if metadata.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(metadata.len());
    for key in CANONICAL_KEYS {
        if let Some(value) = metadata.get(*key) {
            lines.push(format!("{}: {}", key, sanitize_value(value)));
        }
    }
    let mut rest: Vec<&String> = metadata
        .keys()
        .filter(|k| !CANONICAL_KEYS.contains(&k.as_str()))
        .collect();
    rest.sort();
    for key in rest {
        lines.push(format!("{}: {}", key, sanitize_value(&metadata[key])));
    }

    format!("---\n{}\n---\n\n", lines.join("\n"))
}

// Frontmatter values are single-line.
fn sanitize_value(value: &str) -> String {
    value.replace(['\n', '\r'], " ").trim().to_string()
}

/// Finalize a successful extractor result: prepend frontmatter when metadata
/// is present and make the counts match the emitted text exactly.
pub fn finalize(mut result: ExtractionResult) -> ExtractionResult {
    let mut recount = result.char_count == 0 && !result.text.is_empty();

    if let Some(metadata) = &result.metadata {
        let header = frontmatter(metadata);
        if !header.is_empty() {
            result.text = format!("{}{}", header, result.text);
            recount = true;
        }
    }

    if recount {
        let (words, chars) = build_counts(&result.text);
        result.word_count = words;
        result.char_count = chars;
    }
    result
}
