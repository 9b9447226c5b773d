//! File tasks and pipeline outcomes.
//!
//! A FileTask is one unit of work: a single detected file moving through
//! the stage chain. It is created by the watcher, owned by the dispatcher
//! until terminal, and retired once its outcome is recorded.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named category of input data (e.g., customer, credit, loan).
///
/// Each kind has its own schema, transformer, and dedup namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetKind(String);

impl DatasetKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Resolve the dataset kind from a file name.
    ///
    /// Convention: the file stem up to the first `_` or `-` names the
    /// dataset (`customer_20240101.csv` → `customer`). Stems without a
    /// separator are used whole.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let name = stem
            .split(|c| c == '_' || c == '-')
            .next()
            .filter(|s| !s.is_empty())?;
        Some(Self(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a task in the stage chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detected,
    Extracting,
    Validating,
    Deduplicating,
    Transforming,
    Writing,
    Publishing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detected => "detected",
            Stage::Extracting => "extracting",
            Stage::Validating => "validating",
            Stage::Deduplicating => "deduplicating",
            Stage::Transforming => "transforming",
            Stage::Writing => "writing",
            Stage::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Terminal result of one pipeline run.
///
/// Consumed exactly once by the logging/alerting collaborators, after
/// which the task is retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Succeeded {
        /// Records extracted from the source file
        records_read: usize,

        /// Records dropped as already committed
        records_deduped: usize,

        /// Records written to the local artifact
        records_written: usize,
    },
    Failed {
        /// Stage at which the run stopped
        stage: Stage,

        /// Error detail for operators
        error: String,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// The failing stage, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Failed { stage, .. } => Some(*stage),
            Self::Succeeded { .. } => None,
        }
    }
}

/// One unit of work: a detected file moving through the stage chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTask {
    /// Content-hash identity (12 hex chars)
    pub id: String,

    /// Source file path
    pub path: PathBuf,

    /// Dataset kind resolved from the file name
    pub kind: DatasetKind,

    /// File size in bytes at detection time
    pub size: u64,

    /// When the watcher detected the file
    pub detected_at: DateTime<Utc>,

    /// Current stage
    pub stage: Stage,

    /// Terminal outcome, once recorded
    pub outcome: Option<PipelineOutcome>,
}

impl FileTask {
    pub fn new(
        id: String,
        path: PathBuf,
        kind: DatasetKind,
        size: u64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            path,
            kind,
            size,
            detected_at,
            stage: Stage::Detected,
            outcome: None,
        }
    }

    /// Move the task to the next stage
    pub fn advance(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Record the terminal outcome
    pub fn finish(&mut self, outcome: PipelineOutcome) {
        self.outcome = Some(outcome);
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}
