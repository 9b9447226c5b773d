//! Shipped artifact writer.
//!
//! The physical columnar format is a black box to the core; this writer
//! materializes a column-major JSON file, which downstream tooling can
//! re-encode as needed.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::{Artifact, DatasetKind, Record};

use super::{ArtifactWriter, WriteError};

/// Writes records as a column-major JSON document:
///
/// ```json
/// { "kind": "customer", "row_count": 2,
///   "columns": { "customer_id": ["C-1", "C-2"], ... } }
/// ```
pub struct JsonColumnWriter;

impl JsonColumnWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonColumnWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactWriter for JsonColumnWriter {
    fn name(&self) -> &str {
        "json-column"
    }

    async fn write(
        &self,
        kind: &DatasetKind,
        records: &[Record],
        dest: &Path,
    ) -> Result<Artifact, WriteError> {
        // BTreeMap keeps column order deterministic
        let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        for record in records {
            for name in record.fields.keys() {
                columns.entry(name.clone()).or_default();
            }
        }

        for record in records {
            for (name, column) in columns.iter_mut() {
                column.push(record.get(name).cloned().unwrap_or(Value::Null));
            }
        }

        let document = json!({
            "kind": kind.as_str(),
            "row_count": records.len(),
            "columns": columns,
        });

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(dest, &bytes).await?;

        Ok(Artifact::new(
            dest.to_path_buf(),
            kind.clone(),
            records.len(),
            bytes.len() as u64,
        ))
    }
}
