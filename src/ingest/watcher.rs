//! Drop-directory file watcher (the producer).
//!
//! Watches the inbound directory for new data files and enqueues a
//! FileTask once a file is stable (its size has stopped changing).
//! Task identity is the file's content hash, so the same delivery is
//! never enqueued twice while a prior task for it is in flight, and a
//! rewritten file is re-detected as new work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{DatasetKind, FileTask};

use super::queue::{compute_file_hash, InFlightTracker, TaskSender};

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Directory to watch for inbound files
    pub watch_dir: PathBuf,

    /// How long a file's size must be stable before processing (seconds)
    pub stability_delay_secs: u64,

    /// File extensions to pick up
    pub extensions: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("inbox"),
            stability_delay_secs: 5,
            extensions: vec![
                "csv".to_string(),
                "tsv".to_string(),
                "txt".to_string(),
                "json".to_string(),
            ],
        }
    }
}

impl WatcherConfig {
    /// Check that the watch directory exists
    pub fn validate(&self) -> Result<(), WatchError> {
        if !self.watch_dir.exists() {
            return Err(WatchError::DirectoryNotFound(self.watch_dir.clone()));
        }
        Ok(())
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Result of a one-shot directory sweep
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Tasks enqueued
    pub enqueued: usize,

    /// Files skipped because a task for them is already in flight
    pub in_flight: usize,

    /// Files skipped because no dataset kind could be resolved
    pub unresolvable: usize,

    /// Files that could not be read or hashed
    pub errors: usize,
}

/// Watches the drop directory and produces FileTasks
pub struct FileWatcher {
    config: WatcherConfig,
}

impl FileWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Sweep the directory once and enqueue every matching file that is
    /// not already in flight.
    pub async fn scan_once(
        &self,
        queue: &TaskSender,
        tracker: &InFlightTracker,
    ) -> Result<ScanReport, WatchError> {
        self.config.validate()?;

        let mut report = ScanReport::default();
        let mut entries = tokio::fs::read_dir(&self.config.watch_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if !self.config.matches_extension(&path) {
                continue;
            }

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(_) => continue,
            };

            if !metadata.is_file() {
                continue;
            }

            match enqueue_file(&path, metadata.len(), queue, tracker).await {
                Ok(EnqueueOutcome::Enqueued) => report.enqueued += 1,
                Ok(EnqueueOutcome::InFlight) => report.in_flight += 1,
                Ok(EnqueueOutcome::NoKind) => report.unresolvable += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to enqueue file");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Watch the directory continuously, enqueueing files once stable.
    /// Runs until stopped via the returned handle.
    pub fn watch(
        &self,
        queue: TaskSender,
        tracker: InFlightTracker,
    ) -> Result<WatchHandle, WatchError> {
        self.config.validate()?;

        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = run_watcher(config, queue, tracker, stop_rx).await {
                tracing::error!(error = %e, "Watcher terminated");
            }
        });

        Ok(WatchHandle { stop_tx, task })
    }
}

/// Handle to stop the watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher and wait for its task to finish
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

enum EnqueueOutcome {
    Enqueued,
    InFlight,
    NoKind,
}

/// Hash the file, resolve its dataset kind, and enqueue a task unless
/// one for the same identity is already in flight.
async fn enqueue_file(
    path: &Path,
    size: u64,
    queue: &TaskSender,
    tracker: &InFlightTracker,
) -> Result<EnqueueOutcome, WatchError> {
    let Some(kind) = DatasetKind::from_path(path) else {
        warn!(path = %path.display(), "Cannot resolve dataset kind from file name");
        return Ok(EnqueueOutcome::NoKind);
    };

    let id = compute_file_hash(path).await?;

    if !tracker.claim(&id) {
        debug!(path = %path.display(), %id, "Task already in flight");
        return Ok(EnqueueOutcome::InFlight);
    }

    let task = FileTask::new(id.clone(), path.to_path_buf(), kind, size, Utc::now());

    if queue.send(task).await.is_err() {
        // Consumer gone; undo the claim so a later dispatcher can retry
        tracker.release(&id);
        return Err(WatchError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "work queue closed",
        )));
    }

    info!(path = %path.display(), %id, "File enqueued");
    Ok(EnqueueOutcome::Enqueued)
}

/// Internal watcher loop.
///
/// Transient errors (directory momentarily unreadable, notify hiccups)
/// are retried with exponential backoff; the loop only exits on stop.
async fn run_watcher(
    config: WatcherConfig,
    queue: TaskSender,
    tracker: InFlightTracker,
    mut stop_rx: mpsc::Receiver<()>,
) -> Result<(), WatchError> {
    // Files being stabilized: path → (size, last change)
    let mut pending: HashMap<PathBuf, (u64, Instant)> = HashMap::new();

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_secs(1), tx)?;
    debouncer
        .watcher()
        .watch(&config.watch_dir, RecursiveMode::NonRecursive)?;

    let stability_delay = Duration::from_secs(config.stability_delay_secs);
    let mut backoff = Duration::from_millis(500);

    info!(dir = %config.watch_dir.display(), "Watching for inbound files");

    loop {
        if stop_rx.try_recv().is_ok() {
            info!("Watcher stopping");
            break;
        }

        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(events)) => {
                backoff = Duration::from_millis(500);

                for event in events {
                    let path = event.path;

                    if !config.matches_extension(&path) {
                        continue;
                    }

                    if let Ok(metadata) = std::fs::metadata(&path) {
                        if metadata.is_file() {
                            pending.insert(path, (metadata.len(), Instant::now()));
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = ?e, backoff_ms = backoff.as_millis() as u64, "Watch error, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(30));
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Expected; fall through to the stability check
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                warn!("Watch channel disconnected");
                break;
            }
        }

        // Promote files whose size has stopped changing
        let now = Instant::now();
        let mut stable = Vec::new();

        for (path, (last_size, last_seen)) in pending.iter_mut() {
            match std::fs::metadata(path) {
                Ok(metadata) => {
                    let current = metadata.len();
                    if current != *last_size {
                        *last_size = current;
                        *last_seen = now;
                    } else if current > 0 && now.duration_since(*last_seen) >= stability_delay {
                        stable.push((path.clone(), current));
                    }
                }
                Err(_) => {
                    // Vanished mid-stabilization; forget it
                    stable.push((path.clone(), 0));
                }
            }
        }

        for (path, size) in stable {
            pending.remove(&path);

            if size == 0 {
                continue;
            }

            match enqueue_file(&path, size, &queue, &tracker).await {
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to enqueue file");
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}
