//! Plugin interfaces for the pluggable pipeline collaborators.
//!
//! Extractors, transformers, artifact writers, publishers, and alerters
//! are consumed by the core only through these traits. The registry
//! binds concrete implementations to file extensions and dataset kinds
//! at startup.

pub mod alert;
pub mod extract;
pub mod publish;
pub mod transform;
pub mod write;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Artifact, DatasetKind, Record, Stage};

// Re-export the shipped implementations
pub use alert::WebhookAlerter;
pub use extract::{CsvExtractor, JsonExtractor};
pub use publish::{DirectoryPublisher, HttpPublisher};
pub use transform::{PassthroughTransformer, RenameTransformer};
pub use write::JsonColumnWriter;

/// Malformed or unreadable input
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input at {path}: {detail}")]
    Malformed { path: String, detail: String },

    #[error("No extractor registered for '{0}'")]
    Unsupported(String),
}

/// Unrecoverable business-rule violation
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Record rejected: {0}")]
    RecordRejected(String),

    #[error("No transformer registered for dataset kind '{0}'")]
    Unsupported(String),
}

/// Local I/O or encoding failure while materializing the artifact
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Remote handoff failure
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Publish rejected: {0}")]
    Rejected(String),
}

/// Failure to deliver an alert (best-effort, logged but never fatal)
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}

/// Produces records from a source file. Keyed by file extension.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable extractor name
    fn name(&self) -> &str;

    /// Extract all records from the file at `path`.
    ///
    /// Fails on malformed input, never on business-rule violations.
    async fn extract(&self, path: &Path) -> Result<Vec<Record>, ExtractError>;
}

/// Applies dataset-specific business rules. Keyed by dataset kind.
///
/// Whether individual bad records are skipped or the whole batch is
/// rejected is this trait's policy, not the sequencer's.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, records: Vec<Record>) -> Result<Vec<Record>, TransformError>;
}

/// Materializes transformed records as a local columnar file.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    fn name(&self) -> &str;

    async fn write(
        &self,
        kind: &DatasetKind,
        records: &[Record],
        dest: &Path,
    ) -> Result<Artifact, WriteError>;
}

/// Hands a local artifact to the downstream store. All-or-nothing per
/// call: a returned `Ok` means the artifact is durable downstream.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, artifact: &Artifact) -> Result<(), PublishError>;
}

/// Best-effort operator alerting channel.
#[async_trait]
pub trait Alerter: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, task_id: &str, stage: Stage, detail: &str) -> Result<(), AlertError>;
}
