//! Shipped extractors: CSV/delimited text and JSON.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::Record;

use super::{ExtractError, Extractor};

/// Extractor for CSV and delimited-text deliveries.
///
/// The first row is the header. Empty cells become null; everything
/// else stays a raw string; typing is the schema gate's concern.
pub struct CsvExtractor {
    delimiter: u8,
}

impl CsvExtractor {
    /// Comma-delimited (`.csv`)
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Custom delimiter (`.tsv`, pipe-delimited `.txt`, ...)
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for CsvExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for CsvExtractor {
    fn name(&self) -> &str {
        "csv"
    }

    async fn extract(&self, path: &Path) -> Result<Vec<Record>, ExtractError> {
        let bytes = tokio::fs::read(path).await?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| malformed(path, e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if headers.is_empty() {
            return Err(malformed(path, "missing header row".to_string()));
        }

        let mut records = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let row_values = result.map_err(|e| malformed(path, format!("row {}: {}", row + 1, e)))?;

            let mut fields = HashMap::with_capacity(headers.len());
            for (header, cell) in headers.iter().zip(row_values.iter()) {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                fields.insert(header.clone(), value);
            }

            records.push(Record::new(fields));
        }

        Ok(records)
    }
}

/// Extractor for JSON deliveries: a top-level array of objects, or
/// newline-delimited objects (JSONL).
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }

    fn object_to_record(path: &Path, row: usize, value: Value) -> Result<Record, ExtractError> {
        match value {
            Value::Object(map) => Ok(Record::new(map.into_iter().collect())),
            other => Err(malformed(
                path,
                format!("row {}: expected object, got {}", row + 1, type_name(&other)),
            )),
        }
    }
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for JsonExtractor {
    fn name(&self) -> &str {
        "json"
    }

    async fn extract(&self, path: &Path) -> Result<Vec<Record>, ExtractError> {
        let content = tokio::fs::read_to_string(path).await?;
        let trimmed = content.trim_start();

        if trimmed.starts_with('[') {
            let values: Vec<Value> = serde_json::from_str(&content)
                .map_err(|e| malformed(path, e.to_string()))?;

            return values
                .into_iter()
                .enumerate()
                .map(|(row, v)| Self::object_to_record(path, row, v))
                .collect();
        }

        // JSONL: one object per non-empty line
        let mut records = Vec::new();

        for (row, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(line)
                .map_err(|e| malformed(path, format!("line {}: {}", row + 1, e)))?;
            records.push(Self::object_to_record(path, row, value)?);
        }

        Ok(records)
    }
}

fn malformed(path: &Path, detail: String) -> ExtractError {
    ExtractError::Malformed {
        path: path.display().to_string(),
        detail,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
