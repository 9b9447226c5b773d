//! Local artifacts.
//!
//! An Artifact is the locally materialized columnar output of one
//! pipeline run, handed to the publish collaborator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::DatasetKind;

/// Handle to a materialized local artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the local file
    pub path: PathBuf,

    /// Dataset kind the artifact belongs to
    pub kind: DatasetKind,

    /// Rows written
    pub rows: usize,

    /// Size in bytes
    pub size_bytes: u64,

    /// When the artifact was written
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(path: PathBuf, kind: DatasetKind, rows: usize, size_bytes: u64) -> Self {
        Self {
            path,
            kind,
            rows,
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// File name of the artifact
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
