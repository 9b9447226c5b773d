//! Pipeline Integration Tests
//!
//! End-to-end runs of the stage sequencer against real files, a real
//! state store, and a recording publisher.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use datalift::core::{PluginRegistry, StageSequencer, StateStore};
use datalift::domain::{
    Artifact, DatasetKind, FileTask, PipelineOutcome, SchemaCatalog, SchemaDefinition, Stage,
};
use datalift::plugins::{PublishError, Publisher};

/// Publisher that records every artifact and can be told to fail
struct RecordingPublisher {
    published: Mutex<Vec<Artifact>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    fn published(&self) -> Vec<Artifact> {
        self.published.lock().unwrap().clone()
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, artifact: &Artifact) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Upload("injected failure".to_string()));
        }
        self.published.lock().unwrap().push(artifact.clone());
        Ok(())
    }
}

fn customer_schema() -> SchemaDefinition {
    SchemaDefinition::from_yaml(
        r#"
kind: customer
key_fields: [customer_id]
fields:
  - name: customer_id
    type: string
    pattern: "^C-[0-9]+$"
  - name: name
    type: string
  - name: balance
    type: float
    nullable: true
"#,
    )
    .unwrap()
}

struct Fixture {
    temp: TempDir,
    sequencer: StageSequencer,
    state: Arc<StateStore>,
    publisher: Arc<RecordingPublisher>,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let state = Arc::new(StateStore::open(&temp.path().join("state")).unwrap());
    let publisher = Arc::new(RecordingPublisher::new());

    let sequencer = StageSequencer::new(
        Arc::new(PluginRegistry::standard()),
        Arc::new(SchemaCatalog::from_definitions(vec![customer_schema()])),
        state.clone(),
        publisher.clone(),
        temp.path().join("artifacts"),
    );

    Fixture {
        temp,
        sequencer,
        state,
        publisher,
    }
}

async fn task_for(path: &Path) -> FileTask {
    let id = datalift::ingest::compute_file_hash(path).await.unwrap();
    FileTask::new(
        id,
        path.to_path_buf(),
        DatasetKind::from_path(path).unwrap(),
        std::fs::metadata(path).unwrap().len(),
        Utc::now(),
    )
}

#[tokio::test]
async fn test_happy_path_publishes_and_commits() {
    let fx = fixture();
    let file = fx.temp.path().join("customer_20240101.csv");
    std::fs::write(&file, "customer_id,name,balance\nC-1,Ada,10.0\nC-2,Grace,\n").unwrap();

    let mut task = task_for(&file).await;
    let outcome = fx.sequencer.run(&mut task).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Succeeded {
            records_read: 2,
            records_deduped: 0,
            records_written: 2,
        }
    );

    let published = fx.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].rows, 2);
    assert!(published[0].path.exists());

    // Keys are committed only after publish succeeded
    let kind = DatasetKind::new("customer");
    let unseen = fx
        .state
        .seen(&kind, &["C-1".to_string(), "C-2".to_string()])
        .await;
    assert!(unseen.is_empty());
}

#[tokio::test]
async fn test_overlapping_second_delivery_writes_only_new_keys() {
    let fx = fixture();

    let first = fx.temp.path().join("customer_day1.csv");
    std::fs::write(&first, "customer_id,name,balance\nC-1,Ada,1.0\n").unwrap();
    let mut task = task_for(&first).await;
    fx.sequencer.run(&mut task).await;

    let second = fx.temp.path().join("customer_day2.csv");
    std::fs::write(
        &second,
        "customer_id,name,balance\nC-1,Ada,1.0\nC-2,Grace,2.0\n",
    )
    .unwrap();
    let mut task = task_for(&second).await;
    let outcome = fx.sequencer.run(&mut task).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Succeeded {
            records_read: 2,
            records_deduped: 1,
            records_written: 1,
        }
    );

    // The second artifact carries only the unseen record
    let published = fx.publisher.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].rows, 1);
}

#[tokio::test]
async fn test_schema_violation_stops_at_validating() {
    let fx = fixture();
    let file = fx.temp.path().join("customer_bad.csv");
    // customer_id violates the pattern; balance is not a number
    std::fs::write(&file, "customer_id,name,balance\nX-1,Ada,abc\n").unwrap();

    let mut task = task_for(&file).await;
    let outcome = fx.sequencer.run(&mut task).await;

    match outcome {
        PipelineOutcome::Failed { stage, error } => {
            assert_eq!(stage, Stage::Validating);
            assert!(error.contains("customer_bad") || error.contains("violation"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }

    // Nothing was written or published, and no keys were committed
    assert!(fx.publisher.published().is_empty());
    let unseen = fx
        .state
        .seen(&DatasetKind::new("customer"), &["X-1".to_string()])
        .await;
    assert_eq!(unseen, vec!["X-1".to_string()]);
}

#[tokio::test]
async fn test_fully_deduped_delivery_succeeds_with_zero_written() {
    let fx = fixture();

    let file = fx.temp.path().join("customer_day1.csv");
    std::fs::write(&file, "customer_id,name,balance\nC-1,Ada,1.0\n").unwrap();
    let mut task = task_for(&file).await;
    fx.sequencer.run(&mut task).await;

    // Identical content re-delivered under a new name
    let redelivery = fx.temp.path().join("customer_day2.csv");
    std::fs::write(&redelivery, "customer_id,name,balance\nC-1,Ada,1.0\n").unwrap();
    let mut task = task_for(&redelivery).await;
    let outcome = fx.sequencer.run(&mut task).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Succeeded {
            records_read: 1,
            records_deduped: 1,
            records_written: 0,
        }
    );

    // No second artifact was produced for the empty surviving subset
    assert_eq!(fx.publisher.published().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_leaves_keys_uncommitted() {
    let fx = fixture();
    fx.publisher.set_failing(true);

    let file = fx.temp.path().join("customer_day1.csv");
    std::fs::write(&file, "customer_id,name,balance\nC-1,Ada,1.0\n").unwrap();

    let mut task = task_for(&file).await;
    let outcome = fx.sequencer.run(&mut task).await;

    assert_eq!(outcome.failed_stage(), Some(Stage::Publishing));

    // The keys must still be reported unseen: publish and state move together
    let unseen = fx
        .state
        .seen(&DatasetKind::new("customer"), &["C-1".to_string()])
        .await;
    assert_eq!(unseen, vec!["C-1".to_string()]);

    // A retry after the outage succeeds and commits
    fx.publisher.set_failing(false);
    let mut task = task_for(&file).await;
    let outcome = fx.sequencer.run(&mut task).await;
    assert!(outcome.is_success());

    let unseen = fx
        .state
        .seen(&DatasetKind::new("customer"), &["C-1".to_string()])
        .await;
    assert!(unseen.is_empty());
}

#[tokio::test]
async fn test_json_delivery_through_same_chain() {
    let fx = fixture();
    let file = fx.temp.path().join("customer_feed.json");
    std::fs::write(
        &file,
        r#"[{"customer_id": "C-7", "name": "Lin", "balance": 3.5}]"#,
    )
    .unwrap();

    let mut task = task_for(&file).await;
    let outcome = fx.sequencer.run(&mut task).await;

    assert!(outcome.is_success());
    assert_eq!(fx.publisher.published()[0].rows, 1);
}
