//! Source code passthrough. Files are wrapped in a fenced block tagged with
//! the language inferred from the extension; very large files are reduced to
//! a head plus signature/docs summary so a generated bundle cannot dominate
//! an embedding corpus.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::extract::router::file_extension;
use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

const MAX_FULL_LINES: usize = 10_000;
const SUMMARY_HEAD_LINES: usize = 50;
const SUMMARY_MAX_SIGNATURES: usize = 500;

pub struct SourceExtractor {
    max_bytes: u64,
}

impl SourceExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for SourceExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;
        let mut text = String::from_utf8_lossy(&bytes).trim().to_string();

        let ext = file_extension(&job.file_name);
        let lang = language_for(&ext);
        let mut lines = text.lines().count().max(1);

        if lines > MAX_FULL_LINES {
            text = summarize_large_code(&text);
            lines = text.lines().count().max(1);
        }

        let wrapped = format!("<!-- lang: {lang}, lines: {lines} -->\n\n```{lang}\n{text}\n```");
        let (word_count, char_count) = build_counts(&wrapped);
        let metadata = HashMap::from([("language".to_string(), lang.to_string())]);

        Ok(ExtractionResult {
            success: true,
            text: wrapped,
            method: "code".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            metadata: Some(metadata),
            word_count,
            char_count,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "code/source"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".py", ".pyw", ".pyi", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".go", ".java",
            ".kt", ".kts", ".scala", ".groovy", ".gradle", ".c", ".h", ".cpp", ".hpp", ".cc",
            ".cxx", ".cs", ".rb", ".php", ".swift", ".m", ".mm", ".rs", ".dart", ".ex", ".exs",
            ".erl", ".hs", ".ml", ".mli", ".clj", ".cljs", ".lua", ".r", ".jl", ".pl", ".pm",
            ".zig", ".nim", ".cr", ".d", ".sh", ".bash", ".zsh", ".fish", ".ps1", ".bat", ".cmd",
            ".sql", ".graphql", ".gql", ".proto", ".tf", ".hcl", ".nix", ".toml",
        ]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

static LANGUAGE_BY_EXT: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (".py", "python"), (".pyw", "python"), (".pyi", "python"),
        (".js", "javascript"), (".jsx", "jsx"), (".mjs", "javascript"), (".cjs", "javascript"),
        (".ts", "typescript"), (".tsx", "tsx"),
        (".go", "go"), (".java", "java"), (".kt", "kotlin"), (".kts", "kotlin"),
        (".scala", "scala"), (".groovy", "groovy"), (".gradle", "groovy"),
        (".c", "c"), (".h", "c"), (".cpp", "cpp"), (".hpp", "cpp"), (".cc", "cpp"), (".cxx", "cpp"),
        (".cs", "csharp"), (".rb", "ruby"), (".php", "php"), (".swift", "swift"),
        (".m", "objective-c"), (".mm", "objective-c"), (".rs", "rust"), (".dart", "dart"),
        (".ex", "elixir"), (".exs", "elixir"), (".erl", "erlang"), (".hs", "haskell"),
        (".ml", "ocaml"), (".mli", "ocaml"), (".clj", "clojure"), (".cljs", "clojure"),
        (".lua", "lua"), (".r", "r"), (".jl", "julia"), (".pl", "perl"), (".pm", "perl"),
        (".zig", "zig"), (".nim", "nim"), (".cr", "crystal"), (".d", "d"),
        (".sh", "bash"), (".bash", "bash"), (".zsh", "zsh"), (".fish", "fish"),
        (".ps1", "powershell"), (".bat", "bat"), (".cmd", "bat"), (".sql", "sql"),
        (".graphql", "graphql"), (".gql", "graphql"), (".proto", "proto"),
        (".tf", "hcl"), (".hcl", "hcl"), (".nix", "nix"), (".toml", "toml"),
    ])
});

fn language_for(ext: &str) -> &'static str {
    LANGUAGE_BY_EXT.get(ext).copied().unwrap_or("text")
}

/// Head of the file plus declaration/comment lines, capped.
fn summarize_large_code(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let head = &lines[..lines.len().min(SUMMARY_HEAD_LINES)];

    let mut signatures: Vec<&str> = Vec::new();
    for line in &lines {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let is_decl = ["func ", "fn ", "class ", "def ", "interface ", "type ", "impl "]
            .iter()
            .any(|p| trimmed.starts_with(p));
        let is_doc = trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || trimmed.starts_with("/*")
            || trimmed.starts_with("\"\"\"");
        if is_decl || is_doc {
            signatures.push(line);
        }
        if signatures.len() >= SUMMARY_MAX_SIGNATURES {
            break;
        }
    }

    format!(
        "{}\n\n/* signatures + docs */\n{}",
        head.join("\n"),
        signatures.join("\n")
    )
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_extensions_to_languages() {
        assert_eq!(language_for(".rs"), "rust");
        assert_eq!(language_for(".py"), "python");
        assert_eq!(language_for(".weird"), "text");
    }

    #[test]
    fn summary_keeps_declarations() {
        let source = (0..11_000)
            .map(|i| {
                if i % 100 == 0 {
                    format!("fn thing_{i}() {{")
                } else {
                    format!("    let x = {i};")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let summary = summarize_large_code(&source);
        assert!(summary.contains("/* signatures + docs */"));
        assert!(summary.contains("fn thing_10000()"));
        assert!(summary.lines().count() < 1000);
    }
}
