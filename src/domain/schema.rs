//! Dataset schemas.
//!
//! Schemas are defined in YAML, one file per dataset kind, and declare
//! the columns a delivery must carry before any further processing.
//! Loaded once at startup; immutable and shared read-only across
//! concurrent runs. The catalog supports reload without restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::task::DatasetKind;

/// Declared shape of one dataset kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Dataset kind this schema applies to
    pub kind: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Field or fields that uniquely identify a record for dedup
    pub key_fields: Vec<String>,

    /// Required columns, in declaration order
    pub fields: Vec<FieldSpec>,
}

impl SchemaDefinition {
    /// Load a schema from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a schema from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let schema: Self = serde_yaml::from_str(content).context("Failed to parse schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    /// Validate the schema definition itself
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_empty() {
            anyhow::bail!("Schema kind cannot be empty");
        }

        if self.fields.is_empty() {
            anyhow::bail!("Schema '{}' must declare at least one field", self.kind);
        }

        if self.key_fields.is_empty() {
            anyhow::bail!("Schema '{}' must declare at least one key field", self.kind);
        }

        for key in &self.key_fields {
            match self.fields.iter().find(|f| &f.name == key) {
                None => anyhow::bail!(
                    "Schema '{}' key field '{}' is not a declared field",
                    self.kind,
                    key
                ),
                Some(spec) if spec.nullable => anyhow::bail!(
                    "Schema '{}' key field '{}' cannot be nullable",
                    self.kind,
                    key
                ),
                Some(_) => {}
            }
        }

        for field in &self.fields {
            if field.name.is_empty() {
                anyhow::bail!("Schema '{}' has a field with an empty name", self.kind);
            }

            if let Some(ref pattern) = field.pattern {
                regex::Regex::new(pattern).with_context(|| {
                    format!(
                        "Schema '{}' field '{}' has an invalid pattern",
                        self.kind, field.name
                    )
                })?;
            }
        }

        Ok(())
    }

    /// Get a field spec by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One required column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name
    pub name: String,

    /// Expected primitive type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether null values are accepted
    #[serde(default)]
    pub nullable: bool,

    /// Allowed values (enum constraint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,

    /// Regex the string form of the value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Primitive column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        }
    }
}

/// All loaded schemas, keyed by dataset kind.
///
/// Lookups hand out `Arc`s so concurrent runs share one immutable
/// definition; `reload` swaps the whole map without disturbing runs that
/// already hold a reference.
pub struct SchemaCatalog {
    schemas_dir: PathBuf,
    schemas: RwLock<HashMap<String, Arc<SchemaDefinition>>>,
}

impl SchemaCatalog {
    /// Load every `*.yaml` schema in a directory
    pub fn load_dir(schemas_dir: &Path) -> Result<Self> {
        let schemas = Self::read_dir(schemas_dir)?;

        Ok(Self {
            schemas_dir: schemas_dir.to_path_buf(),
            schemas: RwLock::new(schemas),
        })
    }

    /// Build a catalog from already-parsed definitions (used in tests)
    pub fn from_definitions(defs: Vec<SchemaDefinition>) -> Self {
        let schemas = defs
            .into_iter()
            .map(|d| (d.kind.clone(), Arc::new(d)))
            .collect();

        Self {
            schemas_dir: PathBuf::new(),
            schemas: RwLock::new(schemas),
        }
    }

    fn read_dir(dir: &Path) -> Result<HashMap<String, Arc<SchemaDefinition>>> {
        let mut schemas = HashMap::new();

        if !dir.exists() {
            return Ok(schemas);
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read schemas directory: {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();

            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);

            if !is_yaml {
                continue;
            }

            let schema = SchemaDefinition::from_file(&path)?;
            schemas.insert(schema.kind.clone(), Arc::new(schema));
        }

        Ok(schemas)
    }

    /// Look up the schema for a dataset kind
    pub fn get(&self, kind: &DatasetKind) -> Option<Arc<SchemaDefinition>> {
        self.schemas
            .read()
            .expect("schema catalog lock poisoned")
            .get(kind.as_str())
            .cloned()
    }

    /// Dataset kinds with a loaded schema
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .schemas
            .read()
            .expect("schema catalog lock poisoned")
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    /// Re-read the schemas directory, replacing the loaded set
    pub fn reload(&self) -> Result<usize> {
        let fresh = Self::read_dir(&self.schemas_dir)?;
        let count = fresh.len();

        *self.schemas.write().expect("schema catalog lock poisoned") = fresh;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOMER_SCHEMA_YAML: &str = r#"
kind: customer
description: Customer master deliveries

key_fields:
  - customer_id

fields:
  - name: customer_id
    type: string
    pattern: "^C-[0-9]+$"

  - name: name
    type: string

  - name: segment
    type: string
    allowed: [retail, corporate]

  - name: balance
    type: float
    nullable: true
"#;

    #[test]
    fn test_schema_parsing() {
        let schema = SchemaDefinition::from_yaml(CUSTOMER_SCHEMA_YAML).unwrap();

        assert_eq!(schema.kind, "customer");
        assert_eq!(schema.fields.len(), 4);
        assert_eq!(schema.key_fields, vec!["customer_id".to_string()]);

        let balance = schema.field("balance").unwrap();
        assert_eq!(balance.field_type, FieldType::Float);
        assert!(balance.nullable);
    }

    #[test]
    fn test_key_field_must_be_declared() {
        let yaml = r#"
kind: bad
key_fields: [missing]
fields:
  - name: id
    type: string
"#;
        assert!(SchemaDefinition::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let yaml = r#"
kind: bad
key_fields: [id]
fields:
  - name: id
    type: string
    pattern: "["
"#;
        assert!(SchemaDefinition::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_catalog_load_and_reload() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("customer.yaml"), CUSTOMER_SCHEMA_YAML).unwrap();

        let catalog = SchemaCatalog::load_dir(temp.path()).unwrap();
        assert_eq!(catalog.kinds(), vec!["customer".to_string()]);

        let kind = DatasetKind::new("customer");
        assert!(catalog.get(&kind).is_some());
        assert!(catalog.get(&DatasetKind::new("loan")).is_none());

        // Drop a second schema in and reload
        std::fs::write(
            temp.path().join("loan.yaml"),
            r#"
kind: loan
key_fields: [loan_id]
fields:
  - name: loan_id
    type: string
"#,
        )
        .unwrap();

        let count = catalog.reload().unwrap();
        assert_eq!(count, 2);
        assert!(catalog.get(&DatasetKind::new("loan")).is_some());
    }
}
