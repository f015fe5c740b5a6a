//! LaTeX to readable text: comments go, common wrappers unwrap to their
//! argument, sectioning commands become markdown headings, and remaining
//! commands are dropped. Not a TeX engine; just enough for retrieval.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct LatexExtractor {
    max_bytes: u64,
}

impl LatexExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for LatexExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        let text = latex_to_text(&raw);
        let (word_count, char_count) = build_counts(&text);
        Ok(ExtractionResult {
            success: true,
            text,
            method: "native".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            word_count,
            char_count,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "code/latex"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/x-latex", "text/x-tex"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".tex", ".latex", ".bib", ".sty", ".cls"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(?:^|[^\\])%.*$").unwrap());
static SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?P<kind>chapter|section|subsection|subsubsection)\*?\{(?P<title>[^{}]*)\}")
        .unwrap()
});
static WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:textbf|textit|texttt|emph|underline|mbox|text)\{(?P<body>[^{}]*)\}").unwrap()
});
static ENVIRONMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:begin|end)\{[^{}]*\}").unwrap());
static COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[a-zA-Z]+(?:\[[^\[\]]*\])?(?:\{[^{}]*\})*").unwrap());

fn latex_to_text(latex: &str) -> String {
    let text = COMMENT.replace_all(latex, "");

    let text = SECTION.replace_all(&text, |caps: &regex::Captures| {
        let level = match &caps["kind"] {
            "chapter" => "#",
            "section" => "##",
            "subsection" => "###",
            _ => "####",
        };
        format!("\n{} {}\n", level, &caps["title"])
    });

    // Unwrap twice so nested wrappers resolve one level per pass.
    let text = WRAPPER.replace_all(&text, "$body");
    let text = WRAPPER.replace_all(&text, "$body");

    let text = ENVIRONMENT.replace_all(&text, "");
    let text = COMMAND.replace_all(&text, "");

    let text = text
        .replace("~", " ")
        .replace("\\\\", "\n")
        .replace(['{', '}'], "");

    crate::extract::clean::clean_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_become_headings() {
        let tex = "\\section{Introduction}\nBody text.";
        let out = latex_to_text(tex);
        assert!(out.contains("## Introduction"));
        assert!(out.contains("Body text."));
    }

    #[test]
    fn comments_are_dropped() {
        let out = latex_to_text("kept % gone\nnext");
        assert!(out.contains("kept"));
        assert!(!out.contains("gone"));
    }

    #[test]
    fn wrappers_unwrap() {
        assert_eq!(latex_to_text("\\textbf{bold} and \\emph{em}"), "bold and em");
    }

    #[test]
    fn environments_and_commands_vanish() {
        let tex = "\\begin{document}\\usepackage{geometry}Hello\\end{document}";
        assert_eq!(latex_to_text(tex), "Hello");
    }
}
