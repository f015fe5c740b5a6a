//! Jupyter notebooks: markdown cells pass through, code cells become fenced
//! blocks tagged with the notebook's language, outputs are dropped.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

pub struct NotebookExtractor {
    max_bytes: u64,
}

impl NotebookExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: NotebookMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct NotebookMetadata {
    #[serde(default)]
    language_info: LanguageInfo,
    #[serde(default)]
    kernelspec: KernelSpec,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageInfo {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct KernelSpec {
    #[serde(default)]
    language: String,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// Notebook cell sources are either a string or a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Joined(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Joined(String::new())
    }
}

impl CellSource {
    fn text(&self) -> String {
        match self {
            CellSource::Joined(s) => s.clone(),
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

#[async_trait]
impl Extractor for NotebookExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;

        let notebook: Notebook = match serde_json::from_slice(&bytes) {
            Ok(nb) => nb,
            Err(e) => {
                return Ok(ExtractionResult {
                    success: false,
                    method: "notebook".to_string(),
                    file_type: self.name().to_string(),
                    mime_type: job.mime_type.clone(),
                    error: Some(format!("invalid notebook JSON: {e}")),
                    ..Default::default()
                })
            }
        };

        let language = if !notebook.metadata.language_info.name.is_empty() {
            notebook.metadata.language_info.name.clone()
        } else if !notebook.metadata.kernelspec.language.is_empty() {
            notebook.metadata.kernelspec.language.clone()
        } else {
            "python".to_string()
        };

        let mut blocks: Vec<String> = Vec::new();
        let mut code_cells = 0usize;
        let mut markdown_cells = 0usize;
        for cell in &notebook.cells {
            let source = cell.source.text();
            let source = source.trim();
            if source.is_empty() {
                continue;
            }
            match cell.cell_type.as_str() {
                "markdown" => {
                    markdown_cells += 1;
                    blocks.push(source.to_string());
                }
                "code" => {
                    code_cells += 1;
                    blocks.push(format!("```{language}\n{source}\n```"));
                }
                _ => {}
            }
        }

        let text = blocks.join("\n\n");
        let (word_count, char_count) = build_counts(&text);
        let metadata = HashMap::from([
            ("language".to_string(), language),
            ("codeCells".to_string(), code_cells.to_string()),
            ("markdownCells".to_string(), markdown_cells.to_string()),
        ]);

        Ok(ExtractionResult {
            success: true,
            text,
            method: "notebook".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            metadata: Some(metadata),
            word_count,
            char_count,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "code/notebook"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/x-ipynb+json"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".ipynb"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_source_accepts_both_encodings() {
        let joined: CellSource = serde_json::from_str("\"a\\nb\"").unwrap();
        assert_eq!(joined.text(), "a\nb");

        let lines: CellSource = serde_json::from_str("[\"a\\n\", \"b\"]").unwrap();
        assert_eq!(lines.text(), "a\nb");
    }

    #[test]
    fn notebook_parses_cells() {
        let raw = r##"{
            "cells": [
                {"cell_type": "markdown", "source": ["# Title\n"]},
                {"cell_type": "code", "source": ["print('hi')\n"]},
                {"cell_type": "raw", "source": ["ignored"]}
            ],
            "metadata": {"language_info": {"name": "python"}}
        }"##;
        let nb: Notebook = serde_json::from_str(raw).unwrap();
        assert_eq!(nb.cells.len(), 3);
        assert_eq!(nb.metadata.language_info.name, "python");
    }
}
