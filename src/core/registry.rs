//! Plugin registries.
//!
//! Binds file extensions to extractors and dataset kinds to
//! transformers and writers. Built once at startup and read-only
//! afterwards; shared across workers behind an `Arc`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::DatasetKind;
use crate::plugins::{
    ArtifactWriter, CsvExtractor, ExtractError, Extractor, JsonColumnWriter, JsonExtractor,
    PassthroughTransformer, TransformError, Transformer,
};

/// Registry of pluggable pipeline collaborators
pub struct PluginRegistry {
    /// Extension (lowercase, no dot) → extractor
    extractors: HashMap<String, Arc<dyn Extractor>>,

    /// Dataset kind → transformer
    transformers: HashMap<String, Arc<dyn Transformer>>,

    /// Dataset kind → writer
    writers: HashMap<String, Arc<dyn ArtifactWriter>>,

    /// Transformer used when a kind has no dedicated registration
    default_transformer: Option<Arc<dyn Transformer>>,

    /// Writer used when a kind has no dedicated registration
    default_writer: Arc<dyn ArtifactWriter>,
}

impl PluginRegistry {
    /// An empty registry with the column-JSON writer as default
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            transformers: HashMap::new(),
            writers: HashMap::new(),
            default_transformer: None,
            default_writer: Arc::new(JsonColumnWriter::new()),
        }
    }

    /// The standard registry: CSV (`.csv`), tab-delimited (`.tsv`),
    /// pipe-delimited (`.txt`), and JSON (`.json`) extractors, with
    /// passthrough transformation as the default.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_extractor("csv", Arc::new(CsvExtractor::new()));
        registry.register_extractor("tsv", Arc::new(CsvExtractor::with_delimiter(b'\t')));
        registry.register_extractor("txt", Arc::new(CsvExtractor::with_delimiter(b'|')));
        registry.register_extractor("json", Arc::new(JsonExtractor::new()));
        registry.set_default_transformer(Arc::new(PassthroughTransformer::new()));
        registry
    }

    pub fn register_extractor(&mut self, extension: &str, extractor: Arc<dyn Extractor>) {
        self.extractors
            .insert(extension.to_ascii_lowercase(), extractor);
    }

    pub fn register_transformer(&mut self, kind: &DatasetKind, transformer: Arc<dyn Transformer>) {
        self.transformers
            .insert(kind.as_str().to_string(), transformer);
    }

    pub fn register_writer(&mut self, kind: &DatasetKind, writer: Arc<dyn ArtifactWriter>) {
        self.writers.insert(kind.as_str().to_string(), writer);
    }

    pub fn set_default_transformer(&mut self, transformer: Arc<dyn Transformer>) {
        self.default_transformer = Some(transformer);
    }

    pub fn set_default_writer(&mut self, writer: Arc<dyn ArtifactWriter>) {
        self.default_writer = writer;
    }

    /// Extensions with a registered extractor, sorted
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.extractors.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Resolve the extractor for a file path by its extension
    pub fn extractor_for(&self, path: &Path) -> Result<Arc<dyn Extractor>, ExtractError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        self.extractors
            .get(&extension)
            .cloned()
            .ok_or_else(|| ExtractError::Unsupported(path.display().to_string()))
    }

    /// Resolve the transformer for a dataset kind
    pub fn transformer_for(&self, kind: &DatasetKind) -> Result<Arc<dyn Transformer>, TransformError> {
        self.transformers
            .get(kind.as_str())
            .or(self.default_transformer.as_ref())
            .cloned()
            .ok_or_else(|| TransformError::Unsupported(kind.as_str().to_string()))
    }

    /// Resolve the writer for a dataset kind
    pub fn writer_for(&self, kind: &DatasetKind) -> Arc<dyn ArtifactWriter> {
        self.writers
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| self.default_writer.clone())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_extensions() {
        let registry = PluginRegistry::standard();
        assert_eq!(registry.extensions(), vec!["csv", "json", "tsv", "txt"]);
    }

    #[test]
    fn test_extractor_resolution_by_extension() {
        let registry = PluginRegistry::standard();

        assert!(registry.extractor_for(Path::new("/in/customer_1.CSV")).is_ok());
        assert!(registry.extractor_for(Path::new("/in/credit.json")).is_ok());

        let err = registry.extractor_for(Path::new("/in/customer.parquet"));
        assert!(matches!(err, Err(ExtractError::Unsupported(_))));
    }

    #[test]
    fn test_default_transformer_fallback() {
        let registry = PluginRegistry::standard();
        let transformer = registry.transformer_for(&DatasetKind::new("anything")).unwrap();
        assert_eq!(transformer.name(), "passthrough");
    }

    #[test]
    fn test_missing_transformer_without_default() {
        let registry = PluginRegistry::new();
        let err = registry.transformer_for(&DatasetKind::new("customer"));
        assert!(matches!(err, Err(TransformError::Unsupported(_))));
    }

    #[test]
    fn test_writer_falls_back_to_default() {
        let registry = PluginRegistry::new();
        let writer = registry.writer_for(&DatasetKind::new("customer"));
        assert_eq!(writer.name(), "json-column");
    }
}
