//! Extracted records.
//!
//! A Record is one logical row from a source file. Records are ephemeral:
//! they live only for the duration of one sequencer run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical row extracted from a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Field name → raw value
    pub fields: HashMap<String, Value>,
}

impl Record {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Compute the business key from the schema's declared key fields.
    ///
    /// Multi-field keys are joined with `|`. Returns None if any key
    /// field is absent or null: such records cannot be deduplicated and
    /// the schema gate is expected to have rejected them already.
    pub fn business_key(&self, key_fields: &[String]) -> Option<String> {
        let mut parts = Vec::with_capacity(key_fields.len());

        for field in key_fields {
            let value = self.fields.get(field)?;
            let part = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => return None,
                // Nested values never appear in tabular data
                _ => return None,
            };
            parts.push(part);
        }

        Some(parts.join("|"))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
