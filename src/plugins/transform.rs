//! Shipped transformers.
//!
//! Transformers own the skip-vs-reject policy for bad records; the
//! sequencer only sees the surviving batch or a `TransformError`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::Record;

use super::{TransformError, Transformer};

/// Default transformer: records pass through unchanged.
pub struct PassthroughTransformer;

impl PassthroughTransformer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PassthroughTransformer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transformer for PassthroughTransformer {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn transform(&self, records: Vec<Record>) -> Result<Vec<Record>, TransformError> {
        Ok(records)
    }
}

/// Renames fields according to a source → target mapping.
///
/// Fields without a mapping keep their name. A record that would lose a
/// mapped source field entirely is rejected, failing the batch.
pub struct RenameTransformer {
    mapping: HashMap<String, String>,
    require_sources: bool,
}

impl RenameTransformer {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self {
            mapping,
            require_sources: false,
        }
    }

    /// Reject the batch if any record is missing a mapped source field
    pub fn require_sources(mut self) -> Self {
        self.require_sources = true;
        self
    }
}

#[async_trait]
impl Transformer for RenameTransformer {
    fn name(&self) -> &str {
        "rename"
    }

    async fn transform(&self, records: Vec<Record>) -> Result<Vec<Record>, TransformError> {
        let mut out = Vec::with_capacity(records.len());

        for (row, record) in records.into_iter().enumerate() {
            if self.require_sources {
                for source in self.mapping.keys() {
                    if !record.fields.contains_key(source) {
                        return Err(TransformError::RecordRejected(format!(
                            "row {}: missing field '{}'",
                            row + 1,
                            source
                        )));
                    }
                }
            }

            let fields = record
                .fields
                .into_iter()
                .map(|(name, value)| {
                    let name = self.mapping.get(&name).cloned().unwrap_or(name);
                    (name, value)
                })
                .collect();

            out.push(Record::new(fields));
        }

        Ok(out)
    }
}
