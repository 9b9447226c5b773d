//! Schema gate: dataset-shape validation.
//!
//! A pure function over the whole extracted dataset. No side effects,
//! no shared mutable state; safe to invoke concurrently across files.
//! Partial acceptance is disallowed: one violation fails the file, since
//! downstream transforms assume a fixed shape.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{FieldType, Record, SchemaDefinition};

/// Structural mismatch between a delivery and its declared schema
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("No schema defined for dataset kind '{0}'")]
    UnknownKind(String),

    #[error("{}", format_violations(.kind, .violations))]
    Invalid {
        kind: String,
        violations: Vec<Violation>,
    },

    #[error("row {row}: cannot derive business key from [{fields}]")]
    KeyUnderivable { fields: String, row: usize },
}

impl SchemaError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid { violations, .. } => violations,
            _ => &[],
        }
    }
}

/// One schema violation, located by field and row (1-indexed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingColumn {
        field: String,
        row: usize,
    },
    TypeMismatch {
        field: String,
        row: usize,
        expected: FieldType,
        actual: String,
    },
    NullValue {
        field: String,
        row: usize,
    },
    NotAllowed {
        field: String,
        row: usize,
        value: String,
    },
    PatternMismatch {
        field: String,
        row: usize,
        value: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingColumn { field, row } => {
                write!(f, "row {}: missing column '{}'", row, field)
            }
            Violation::TypeMismatch {
                field,
                row,
                expected,
                actual,
            } => write!(
                f,
                "row {}: column '{}' expected {}, got {}",
                row,
                field,
                expected.name(),
                actual
            ),
            Violation::NullValue { field, row } => {
                write!(f, "row {}: column '{}' must not be null", row, field)
            }
            Violation::NotAllowed { field, row, value } => {
                write!(f, "row {}: column '{}' value '{}' not allowed", row, field, value)
            }
            Violation::PatternMismatch { field, row, value } => {
                write!(
                    f,
                    "row {}: column '{}' value '{}' does not match pattern",
                    row, field, value
                )
            }
        }
    }
}

fn format_violations(kind: &str, violations: &[Violation]) -> String {
    let shown: Vec<String> = violations.iter().take(5).map(|v| v.to_string()).collect();
    let mut msg = format!(
        "Schema validation failed for '{}' ({} violation{}): {}",
        kind,
        violations.len(),
        if violations.len() == 1 { "" } else { "s" },
        shown.join("; ")
    );
    if violations.len() > shown.len() {
        msg.push_str("; ...");
    }
    msg
}

/// Validate a whole extracted dataset against its schema.
///
/// Reports the exhaustive violation list, ordered by schema field
/// declaration order and then by row, so the output is deterministic.
pub fn validate(schema: &SchemaDefinition, records: &[Record]) -> Result<(), SchemaError> {
    // Patterns are pre-validated at schema load; compile once per call.
    let mut patterns: HashMap<&str, Regex> = HashMap::new();
    for field in &schema.fields {
        if let Some(ref pattern) = field.pattern {
            if let Ok(re) = Regex::new(pattern) {
                patterns.insert(field.name.as_str(), re);
            }
        }
    }

    let mut violations = Vec::new();

    for field in &schema.fields {
        for (idx, record) in records.iter().enumerate() {
            let row = idx + 1;

            let value = match record.get(&field.name) {
                None => {
                    violations.push(Violation::MissingColumn {
                        field: field.name.clone(),
                        row,
                    });
                    continue;
                }
                Some(v) => v,
            };

            if value.is_null() {
                if !field.nullable {
                    violations.push(Violation::NullValue {
                        field: field.name.clone(),
                        row,
                    });
                }
                continue;
            }

            let text = match check_type(value, field.field_type) {
                Ok(text) => text,
                Err(actual) => {
                    violations.push(Violation::TypeMismatch {
                        field: field.name.clone(),
                        row,
                        expected: field.field_type,
                        actual,
                    });
                    continue;
                }
            };

            if let Some(ref allowed) = field.allowed {
                if !allowed.iter().any(|a| a == &text) {
                    violations.push(Violation::NotAllowed {
                        field: field.name.clone(),
                        row,
                        value: text.clone(),
                    });
                    continue;
                }
            }

            if let Some(re) = patterns.get(field.name.as_str()) {
                if !re.is_match(&text) {
                    violations.push(Violation::PatternMismatch {
                        field: field.name.clone(),
                        row,
                        value: text,
                    });
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid {
            kind: schema.kind.clone(),
            violations,
        })
    }
}

/// Check a value against the expected primitive type.
///
/// Extractors that cannot type cells (CSV) deliver strings, so a string
/// that parses as the expected type passes. Returns the canonical string
/// form for enum/pattern checks, or the observed type/value on mismatch.
fn check_type(value: &Value, expected: FieldType) -> Result<String, String> {
    match (expected, value) {
        (FieldType::String, Value::String(s)) => Ok(s.clone()),

        (FieldType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        (FieldType::Integer, Value::String(s)) if s.parse::<i64>().is_ok() => Ok(s.clone()),

        (FieldType::Float, Value::Number(n)) => Ok(n.to_string()),
        (FieldType::Float, Value::String(s)) if s.parse::<f64>().is_ok() => Ok(s.clone()),

        (FieldType::Boolean, Value::Bool(b)) => Ok(b.to_string()),
        (FieldType::Boolean, Value::String(s))
            if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") =>
        {
            Ok(s.to_ascii_lowercase())
        }

        (_, other) => Err(describe(other)),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean '{}'", b),
        Value::Number(n) => format!("number '{}'", n),
        Value::String(s) => format!("string '{}'", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}
