//! Dispatcher Integration Tests
//!
//! Exercises the full producer-consumer front: watcher sweep → queue →
//! worker pool → sequencer, including task isolation and concurrent
//! same-kind commits.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use datalift::core::{PluginRegistry, StageSequencer, StateStore};
use datalift::domain::{Artifact, DatasetKind, SchemaCatalog, SchemaDefinition};
use datalift::ingest::{task_queue, Dispatcher, FileWatcher, InFlightTracker, WatcherConfig};
use datalift::plugins::{PublishError, Publisher};

struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    fn name(&self) -> &str {
        "null"
    }

    async fn publish(&self, _artifact: &Artifact) -> Result<(), PublishError> {
        Ok(())
    }
}

fn credit_schema() -> SchemaDefinition {
    SchemaDefinition::from_yaml(
        r#"
kind: credit
key_fields: [account_id]
fields:
  - name: account_id
    type: string
  - name: score
    type: integer
"#,
    )
    .unwrap()
}

fn build_sequencer(temp: &TempDir, state: Arc<StateStore>) -> Arc<StageSequencer> {
    Arc::new(StageSequencer::new(
        Arc::new(PluginRegistry::standard()),
        Arc::new(SchemaCatalog::from_definitions(vec![credit_schema()])),
        state,
        Arc::new(NullPublisher),
        temp.path().join("artifacts"),
    ))
}

fn watcher_for(temp: &TempDir) -> FileWatcher {
    FileWatcher::new(WatcherConfig {
        watch_dir: temp.path().join("inbox"),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_sweep_then_drain_processes_all_files() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    std::fs::write(inbox.join("credit_a.csv"), "account_id,score\nA-1,700\n").unwrap();
    std::fs::write(inbox.join("credit_b.csv"), "account_id,score\nA-2,640\n").unwrap();
    // Malformed delivery in the same sweep
    std::fs::write(inbox.join("credit_c.csv"), "account_id,score\nonly-one-column\n").unwrap();

    let state = Arc::new(StateStore::open(&temp.path().join("state")).unwrap());
    let sequencer = build_sequencer(&temp, state.clone());

    let (tx, rx) = task_queue(None);
    let tracker = InFlightTracker::new();

    let report = watcher_for(&temp)
        .scan_once(&tx, &tracker)
        .await
        .unwrap();
    assert_eq!(report.enqueued, 3);
    drop(tx);

    let dispatcher = Dispatcher::new(sequencer, None, tracker.clone(), 2);
    let stats = dispatcher.start(rx).join().await;

    // The bad file failed alone; the good ones were unaffected
    assert_eq!(stats.processed(), 3);
    assert_eq!(stats.succeeded(), 2);
    assert_eq!(stats.failed(), 1);
    assert!(tracker.is_empty());

    let unseen = state
        .seen(
            &DatasetKind::new("credit"),
            &["A-1".to_string(), "A-2".to_string()],
        )
        .await;
    assert!(unseen.is_empty());
}

#[tokio::test]
async fn test_concurrent_overlapping_deliveries_commit_each_key_once() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    // Several files share account A-OVERLAP
    for i in 0..4 {
        std::fs::write(
            inbox.join(format!("credit_batch{}.csv", i)),
            format!("account_id,score\nA-OVERLAP,700\nA-{},65{}\n", i, i),
        )
        .unwrap();
    }

    let state_dir = temp.path().join("state");
    let state = Arc::new(StateStore::open(&state_dir).unwrap());
    let sequencer = build_sequencer(&temp, state.clone());

    let (tx, rx) = task_queue(None);
    let tracker = InFlightTracker::new();

    watcher_for(&temp).scan_once(&tx, &tracker).await.unwrap();
    drop(tx);

    let dispatcher = Dispatcher::new(sequencer, None, tracker, 4);
    let stats = dispatcher.start(rx).join().await;
    assert_eq!(stats.processed(), 4);
    assert_eq!(stats.failed(), 0);

    // Inspect the commit log: no key may appear in two commit records
    drop(state);
    let log = std::fs::read_to_string(state_dir.join("credit.jsonl")).unwrap();
    let mut seen_keys = HashSet::new();

    for line in log.lines().filter(|l| !l.trim().is_empty()) {
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        for key in record["keys"].as_array().unwrap() {
            let key = key.as_str().unwrap().to_string();
            assert!(
                seen_keys.insert(key.clone()),
                "key '{}' committed more than once",
                key
            );
        }
    }

    assert!(seen_keys.contains("A-OVERLAP"));
    assert_eq!(seen_keys.len(), 5);
}

#[tokio::test]
async fn test_redelivered_identical_file_is_suppressed_while_in_flight() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(inbox.join("credit_a.csv"), "account_id,score\nA-1,700\n").unwrap();

    let (tx, mut rx) = task_queue(None);
    let tracker = InFlightTracker::new();
    let watcher = watcher_for(&temp);

    let first = watcher.scan_once(&tx, &tracker).await.unwrap();
    let second = watcher.scan_once(&tx, &tracker).await.unwrap();

    assert_eq!(first.enqueued, 1);
    assert_eq!(second.enqueued, 0);
    assert_eq!(second.in_flight, 1);

    // Exactly one task reached the queue
    drop(tx);
    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_none());
}
