//! Task dispatcher (the consumer).
//!
//! A pool of workers drains the work queue and runs each FileTask
//! through the stage sequencer. Task isolation is a hard invariant: any
//! failure, including a panic inside a plugin, becomes a terminal
//! outcome for that task and never takes down a worker or touches other
//! tasks. Failed tasks are not retried here; re-processing happens only
//! when the watcher re-detects the file, and the state store makes that
//! idempotent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::StageSequencer;
use crate::domain::PipelineOutcome;
use crate::plugins::Alerter;

use super::queue::{InFlightTracker, TaskReceiver};

/// Counters aggregated across all workers
#[derive(Debug, Default)]
pub struct DispatchStats {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl DispatchStats {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Drains the work queue through a pool of workers
pub struct Dispatcher {
    sequencer: Arc<StageSequencer>,
    alerter: Option<Arc<dyn Alerter>>,
    tracker: InFlightTracker,
    workers: usize,
}

impl Dispatcher {
    pub fn new(
        sequencer: Arc<StageSequencer>,
        alerter: Option<Arc<dyn Alerter>>,
        tracker: InFlightTracker,
        workers: usize,
    ) -> Self {
        Self {
            sequencer,
            alerter,
            tracker,
            workers: workers.max(1),
        }
    }

    /// Start the worker pool on a queue receiver.
    ///
    /// Workers run until the queue is closed and drained, then exit;
    /// `DispatcherHandle::join` waits for that (drain-and-stop shutdown,
    /// a task is never abandoned mid-stage).
    pub fn start(self, receiver: TaskReceiver) -> DispatcherHandle {
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(DispatchStats::default());
        let mut handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let receiver = receiver.clone();
            let sequencer = self.sequencer.clone();
            let alerter = self.alerter.clone();
            let tracker = self.tracker.clone();
            let stats = stats.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // Hold the lock only for the pop, not the processing
                    let task = { receiver.lock().await.recv().await };

                    let Some(task) = task else {
                        info!(worker_id, "Queue closed, worker exiting");
                        break;
                    };

                    process_task(&sequencer, alerter.as_deref(), &tracker, &stats, task).await;
                }
            }));
        }

        DispatcherHandle { handles, stats }
    }
}

/// Handle to the running worker pool
pub struct DispatcherHandle {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl DispatcherHandle {
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Wait for every worker to drain and exit
    pub async fn join(self) -> Arc<DispatchStats> {
        for handle in self.handles {
            let _ = handle.await;
        }
        self.stats
    }
}

/// Run one task to its terminal outcome and route the result.
async fn process_task(
    sequencer: &Arc<StageSequencer>,
    alerter: Option<&dyn Alerter>,
    tracker: &InFlightTracker,
    stats: &DispatchStats,
    task: crate::domain::FileTask,
) {
    let task_id = task.id.clone();
    let kind = task.kind.clone();
    let path = task.path.clone();

    // The task runs in its own spawned task so that even a panic inside
    // a plugin is contained at the join boundary.
    let shared = Arc::new(Mutex::new(task));
    let run = {
        let shared = shared.clone();
        let sequencer = sequencer.clone();
        tokio::spawn(async move {
            let mut task = shared.lock().await;
            sequencer.run(&mut task).await
        })
    };

    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            // Worker-side containment of a plugin panic
            let mut task = shared.lock().await;
            let outcome = PipelineOutcome::Failed {
                stage: task.stage,
                error: format!("task aborted: {}", join_err),
            };
            task.finish(outcome.clone());
            outcome
        }
    };

    stats.processed.fetch_add(1, Ordering::Relaxed);

    match &outcome {
        PipelineOutcome::Succeeded {
            records_read,
            records_deduped,
            records_written,
        } => {
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                %task_id,
                %kind,
                path = %path.display(),
                records_read,
                records_deduped,
                records_written,
                "Task succeeded"
            );
        }
        PipelineOutcome::Failed { stage, error } => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                %task_id,
                %kind,
                path = %path.display(),
                %stage,
                error = %error,
                "Task failed"
            );

            if let Some(alerter) = alerter {
                if let Err(e) = alerter.notify(&task_id, *stage, error).await {
                    // Best-effort only; never fails the task retroactively
                    warn!(%task_id, error = %e, "Alert delivery failed");
                }
            }
        }
    }

    // Terminal: the same file identity may now be re-detected
    tracker.release(&task_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PluginRegistry, StageSequencer, StateStore};
    use crate::domain::{Artifact, DatasetKind, FileTask, SchemaCatalog, SchemaDefinition, Stage};
    use crate::ingest::queue::task_queue;
    use crate::plugins::{PublishError, Publisher};
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

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

    fn customer_schema() -> SchemaDefinition {
        SchemaDefinition::from_yaml(
            r#"
kind: customer
key_fields: [customer_id]
fields:
  - name: customer_id
    type: string
"#,
        )
        .unwrap()
    }

    fn sequencer(temp: &TempDir) -> Arc<StageSequencer> {
        Arc::new(StageSequencer::new(
            Arc::new(PluginRegistry::standard()),
            Arc::new(SchemaCatalog::from_definitions(vec![customer_schema()])),
            Arc::new(StateStore::open(&temp.path().join("state")).unwrap()),
            Arc::new(NullPublisher),
            temp.path().join("artifacts"),
        ))
    }

    fn task_for(path: &std::path::Path, id: &str) -> FileTask {
        FileTask::new(
            id.to_string(),
            path.to_path_buf(),
            DatasetKind::from_path(path).unwrap(),
            0,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_failing_task_does_not_block_the_next() {
        let temp = TempDir::new().unwrap();

        // First file is malformed CSV, second is fine
        let bad = temp.path().join("customer_bad.csv");
        std::fs::write(&bad, "customer_id\nC-1,unexpected-extra-column\n").unwrap();
        let good = temp.path().join("customer_good.csv");
        std::fs::write(&good, "customer_id\nC-1\n").unwrap();

        let (tx, rx) = task_queue(None);
        let tracker = InFlightTracker::new();
        tracker.claim("bad-task");
        tracker.claim("good-task");

        tx.send(task_for(&bad, "bad-task")).await.unwrap();
        tx.send(task_for(&good, "good-task")).await.unwrap();
        drop(tx);

        let dispatcher = Dispatcher::new(sequencer(&temp), None, tracker.clone(), 1);
        let stats = dispatcher.start(rx).join().await;

        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.succeeded(), 1);
        assert_eq!(stats.failed(), 1);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_failure_routes_to_alerter() {
        struct Recording {
            alerts: std::sync::Mutex<Vec<(String, Stage)>>,
        }

        #[async_trait]
        impl Alerter for Recording {
            fn name(&self) -> &str {
                "recording"
            }

            async fn notify(
                &self,
                task_id: &str,
                stage: Stage,
                _detail: &str,
            ) -> Result<(), crate::plugins::AlertError> {
                self.alerts
                    .lock()
                    .unwrap()
                    .push((task_id.to_string(), stage));
                Ok(())
            }
        }

        let temp = TempDir::new().unwrap();
        let bad = temp.path().join("customer_bad.csv");
        std::fs::write(&bad, "customer_id\nC-1,unexpected-extra-column\n").unwrap();

        let (tx, rx) = task_queue(None);
        tx.send(task_for(&bad, "bad-task")).await.unwrap();
        drop(tx);

        let alerter = Arc::new(Recording {
            alerts: std::sync::Mutex::new(Vec::new()),
        });

        let dispatcher = Dispatcher::new(
            sequencer(&temp),
            Some(alerter.clone()),
            InFlightTracker::new(),
            1,
        );
        dispatcher.start(rx).join().await;

        let alerts = alerter.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "bad-task");
        assert_eq!(alerts[0].1, Stage::Extracting);
    }

    #[tokio::test]
    async fn test_workers_drain_then_exit() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("customer_good.csv");
        std::fs::write(&good, "customer_id\nC-9\n").unwrap();

        let (tx, rx) = task_queue(Some(8));
        for i in 0..4 {
            // Same file, distinct synthetic identities
            tx.send(task_for(&good, &format!("task-{}", i))).await.unwrap();
        }
        drop(tx);

        let dispatcher = Dispatcher::new(sequencer(&temp), None, InFlightTracker::new(), 3);
        let stats = dispatcher.start(rx).join().await;

        assert_eq!(stats.processed(), 4);
        // First task commits C-9; the rest dedupe to zero survivors
        assert_eq!(stats.succeeded(), 4);
    }
}
