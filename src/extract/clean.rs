//! Shared text cleaning applied to text-layer output and to each OCR page
//! before merging. Idempotent: `clean_text(clean_text(x)) == clean_text(x)`.

/// Normalize line endings and whitespace:
/// - CRLF and lone CR become LF
/// - zero-width code points (U+200B..U+200D, U+FEFF, U+00AD) are dropped
/// - non-breaking space becomes an ordinary space
/// - runs of three or more empty lines collapse to two
/// - trailing whitespace is trimmed per line; inner whitespace collapses to a
///   single space while leading indentation is preserved
/// - the document's outer whitespace is stripped
pub fn clean_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let text: String = text
        .chars()
        .filter_map(|c| match c {
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}' => None,
            '\u{00A0}' => Some(' '),
            other => Some(other),
        })
        .collect();

    let mut cleaned: Vec<String> = Vec::new();
    let mut consecutive_empty = 0;

    for line in text.split('\n') {
        let line = line.trim_end_matches([' ', '\t']);

        if line.trim().is_empty() {
            consecutive_empty += 1;
            if consecutive_empty <= 2 {
                cleaned.push(String::new());
            }
            continue;
        }
        consecutive_empty = 0;

        let leading = line.len() - line.trim_start_matches([' ', '\t']).len();
        let normalized = line
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if leading > 0 {
            cleaned.push(format!("{}{}", " ".repeat(leading), normalized));
        } else {
            cleaned.push(normalized);
        }
    }

    cleaned.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(clean_text("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn drops_zero_width_and_maps_nbsp() {
        assert_eq!(clean_text("a\u{200B}b\u{FEFF}c"), "abc");
        assert_eq!(clean_text("a\u{00A0}b"), "a b");
        assert_eq!(clean_text("so\u{00AD}ft"), "soft");
    }

    #[test]
    fn collapses_blank_line_runs_to_two() {
        assert_eq!(clean_text("a\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(clean_text("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn trims_trailing_and_collapses_inner_whitespace() {
        assert_eq!(clean_text("hello    world   \t"), "hello world");
        assert_eq!(clean_text("  indented   text"), "  indented text");
        assert_eq!(clean_text("\tindented\t\ttabs"), " indented tabs");
    }

    #[test]
    fn strips_outer_whitespace() {
        assert_eq!(clean_text("\n\n  body  \n\n"), "body");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let samples = [
            "a\r\nb\rc",
            "hello    world",
            "  indented   text\n\n\n\n\nmore",
            "a\u{00A0}\u{200B}b\u{00AD}",
            "\t mixed \t indent\n   next",
            "",
        ];
        for s in samples {
            let once = clean_text(s);
            assert_eq!(clean_text(&once), once, "not idempotent for {s:?}");
        }
    }
}
