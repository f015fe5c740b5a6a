//! Delimited data to a markdown table. The delimiter is probed from a small
//! candidate set; files that refuse to parse as a table pass through as
//! plain text rather than failing the request.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::extract::types::{build_counts, ExtractError, ExtractionResult, Extractor, Job};

/// Rows rendered into the table before eliding the remainder.
const MAX_TABLE_ROWS: usize = 201;

pub struct CsvExtractor {
    max_bytes: u64,
}

impl CsvExtractor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for CsvExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult, ExtractError> {
        let bytes = tokio::fs::read(&job.local_path).await?;

        let Some((records, delimiter)) = read_records(&bytes) else {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            let (word_count, char_count) = build_counts(&text);
            return Ok(ExtractionResult {
                success: true,
                text,
                method: "native".to_string(),
                file_type: self.name().to_string(),
                mime_type: job.mime_type.clone(),
                word_count,
                char_count,
                ..Default::default()
            });
        };

        let text = records_to_markdown(records.clone());
        let (word_count, char_count) = build_counts(&text);
        let metadata = HashMap::from([
            ("rows".to_string(), records.len().to_string()),
            ("columns".to_string(), max_cols(&records).to_string()),
            ("delimiter".to_string(), (delimiter as char).to_string()),
        ]);

        Ok(ExtractionResult {
            success: true,
            text,
            method: "native".to_string(),
            file_type: self.name().to_string(),
            mime_type: job.mime_type.clone(),
            metadata: Some(metadata),
            word_count,
            char_count,
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "structured/csv"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["text/csv", "text/tab-separated-values"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".csv", ".tsv"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_bytes
    }
}

fn read_records(bytes: &[u8]) -> Option<(Vec<Vec<String>>, u8)> {
    for delimiter in [b',', b'\t', b';', b'|'] {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut records: Vec<Vec<String>> = Vec::new();
        let mut ok = true;
        for record in reader.records() {
            match record {
                Ok(r) => records.push(r.iter().map(|f| f.to_string()).collect()),
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if ok && !records.is_empty() && max_cols(&records) > 1 {
            return Some((records, delimiter));
        }
    }
    None
}

fn max_cols(records: &[Vec<String>]) -> usize {
    records.iter().map(Vec::len).max().unwrap_or(0)
}

fn records_to_markdown(mut records: Vec<Vec<String>>) -> String {
    if records.is_empty() {
        return String::new();
    }
    let cols = max_cols(&records);
    for row in records.iter_mut() {
        row.resize(cols, String::new());
    }

    let total = records.len();
    let shown = total.min(MAX_TABLE_ROWS);

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", records[0].join(" | ")));
    out.push_str(&format!("| {} |\n", vec!["---"; cols].join(" | ")));
    for row in &records[1..shown] {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    if total > MAX_TABLE_ROWS {
        out.push_str(&format!("\n... and {} more rows", total - MAX_TABLE_ROWS));
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_comma_delimiter() {
        let (records, delim) = read_records(b"a,b,c\n1,2,3\n").unwrap();
        assert_eq!(delim, b',');
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_tab_delimiter() {
        let (_, delim) = read_records(b"a\tb\n1\t2\n").unwrap();
        assert_eq!(delim, b'\t');
    }

    #[test]
    fn single_column_is_not_a_table() {
        assert!(read_records(b"just a line of text\nanother line\n").is_none());
    }

    #[test]
    fn renders_markdown_table() {
        let records = vec![
            vec!["name".to_string(), "age".to_string()],
            vec!["ada".to_string(), "36".to_string()],
        ];
        let md = records_to_markdown(records);
        assert_eq!(md, "| name | age |\n| --- | --- |\n| ada | 36 |");
    }

    #[test]
    fn elides_rows_beyond_the_cap() {
        let mut records = vec![vec!["h1".to_string(), "h2".to_string()]];
        for i in 0..300 {
            records.push(vec![i.to_string(), i.to_string()]);
        }
        let md = records_to_markdown(records);
        assert!(md.contains("... and 100 more rows"));
    }

    #[test]
    fn ragged_rows_are_padded() {
        let records = vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["1".to_string()],
        ];
        let md = records_to_markdown(records);
        assert!(md.contains("| 1 |  |  |"));
    }
}
