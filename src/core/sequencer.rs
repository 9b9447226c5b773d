//! Stage sequencer: the ordered stage chain for one file.
//!
//! Runs `Extracting → Validating → Deduplicating → Transforming →
//! Writing → Publishing` strictly in order and short-circuits on the
//! first failure: no stage after the failing one executes. The ordering
//! at the end is the linchpin of the keys-never-lost invariant: state is
//! committed only after the publish collaborator confirms success, so a
//! crash between the two can only cause a redundant re-publish of
//! already-durable data, never silent loss.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::{FileTask, PipelineOutcome, Record, SchemaCatalog, Stage};
use crate::plugins::{ExtractError, PublishError, Publisher, TransformError, WriteError};

use super::registry::PluginRegistry;
use super::schema_gate::{self, SchemaError};
use super::state_store::{StateStore, StateStoreError};

/// Error raised by a single stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),
}

/// Executes the stage chain for one FileTask
pub struct StageSequencer {
    registry: Arc<PluginRegistry>,
    schemas: Arc<SchemaCatalog>,
    state: Arc<StateStore>,
    publisher: Arc<dyn Publisher>,
    artifacts_dir: PathBuf,
}

impl StageSequencer {
    pub fn new(
        registry: Arc<PluginRegistry>,
        schemas: Arc<SchemaCatalog>,
        state: Arc<StateStore>,
        publisher: Arc<dyn Publisher>,
        artifacts_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            schemas,
            state,
            publisher,
            artifacts_dir,
        }
    }

    /// Run the full stage chain for one task and record its outcome.
    ///
    /// Never returns an error: every failure becomes a terminal
    /// `PipelineOutcome::Failed` on the task.
    #[instrument(skip(self, task), fields(task_id = %task.id, kind = %task.kind))]
    pub async fn run(&self, task: &mut FileTask) -> PipelineOutcome {
        info!(path = %task.path.display(), "Pipeline run started");

        let outcome = match self.execute(task).await {
            Ok(outcome) => outcome,
            Err((stage, err)) => PipelineOutcome::Failed {
                stage,
                error: err.to_string(),
            },
        };

        task.finish(outcome.clone());
        outcome
    }

    async fn execute(
        &self,
        task: &mut FileTask,
    ) -> Result<PipelineOutcome, (Stage, StageError)> {
        // Extract
        task.advance(Stage::Extracting);
        let extractor = self
            .registry
            .extractor_for(&task.path)
            .map_err(|e| (Stage::Extracting, e.into()))?;
        let records = extractor
            .extract(&task.path)
            .await
            .map_err(|e| (Stage::Extracting, e.into()))?;
        let records_read = records.len();
        debug!(records_read, extractor = extractor.name(), "Extracted");

        // Validate the whole dataset's shape
        task.advance(Stage::Validating);
        let schema = self.schemas.get(&task.kind).ok_or_else(|| {
            (
                Stage::Validating,
                SchemaError::UnknownKind(task.kind.as_str().to_string()).into(),
            )
        })?;
        schema_gate::validate(&schema, &records).map_err(|e| (Stage::Validating, e.into()))?;

        // Dedupe against committed state
        task.advance(Stage::Deduplicating);
        let mut candidate_keys = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let key = record.business_key(&schema.key_fields).ok_or_else(|| {
                (
                    Stage::Deduplicating,
                    SchemaError::KeyUnderivable {
                        fields: schema.key_fields.join(", "),
                        row: idx + 1,
                    }
                    .into(),
                )
            })?;
            candidate_keys.push(key);
        }

        let unseen: HashSet<String> = self
            .state
            .seen(&task.kind, &candidate_keys)
            .await
            .into_iter()
            .collect();

        let mut survivors: Vec<Record> = Vec::new();
        let mut survivor_keys: Vec<String> = Vec::new();
        for (record, key) in records.into_iter().zip(candidate_keys) {
            if unseen.contains(&key) {
                survivors.push(record);
                survivor_keys.push(key);
            }
        }

        let records_deduped = records_read - survivors.len();
        debug!(records_deduped, surviving = survivors.len(), "Deduplicated");

        // Nothing new is a success, not a failure
        if survivors.is_empty() {
            info!(records_read, "All records already committed, nothing to write");
            return Ok(PipelineOutcome::Succeeded {
                records_read,
                records_deduped,
                records_written: 0,
            });
        }

        // Transform
        task.advance(Stage::Transforming);
        let transformer = self
            .registry
            .transformer_for(&task.kind)
            .map_err(|e| (Stage::Transforming, e.into()))?;
        let transformed = transformer
            .transform(survivors)
            .await
            .map_err(|e| (Stage::Transforming, e.into()))?;
        debug!(records = transformed.len(), transformer = transformer.name(), "Transformed");

        // Write the local artifact
        task.advance(Stage::Writing);
        let writer = self.registry.writer_for(&task.kind);
        let dest = self.artifact_path(task);
        let artifact = writer
            .write(&task.kind, &transformed, &dest)
            .await
            .map_err(|e| (Stage::Writing, e.into()))?;
        debug!(artifact = %artifact.path.display(), rows = artifact.rows, "Artifact written");

        // Publish, then commit. Commit only runs after the downstream
        // store confirmed the artifact; the reverse order could lose keys.
        task.advance(Stage::Publishing);
        self.publisher
            .publish(&artifact)
            .await
            .map_err(|e| (Stage::Publishing, e.into()))?;

        match self.state.commit(&task.kind, &survivor_keys).await {
            Ok(committed) => {
                debug!(committed, "Keys committed");
            }
            Err(e) => {
                // The artifact is durable downstream but the keys are
                // not recorded: operators must see this divergence.
                error!(
                    artifact = %artifact.path.display(),
                    error = %e,
                    published_without_commit = true,
                    "State commit failed after confirmed publish; keys will be reprocessed"
                );
                return Err((Stage::Publishing, e.into()));
            }
        }

        let records_written = artifact.rows;
        info!(records_read, records_deduped, records_written, "Pipeline run succeeded");

        Ok(PipelineOutcome::Succeeded {
            records_read,
            records_deduped,
            records_written,
        })
    }

    /// Destination path for a task's artifact.
    ///
    /// Includes a fresh suffix so a re-detected file never overwrites an
    /// earlier run's artifact.
    fn artifact_path(&self, task: &FileTask) -> PathBuf {
        let run_suffix = Uuid::new_v4().simple().to_string();
        self.artifacts_dir.join(task.kind.as_str()).join(format!(
            "{}-{}-{}.json",
            task.kind,
            task.id,
            &run_suffix[..8]
        ))
    }
}
