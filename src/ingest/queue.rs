//! Work queue between the watcher and the dispatcher.
//!
//! A thread-safe FIFO channel of FileTasks. Unbounded by default; the
//! bounded variant applies backpressure by blocking the producer when
//! full; tasks are never dropped. The in-flight tracker prevents the
//! same file identity from being enqueued twice while a prior task for
//! it is still pending or running.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::FileTask;

/// The consumer side of the queue has shut down
#[derive(Debug, Error)]
#[error("Work queue closed")]
pub struct QueueClosed;

/// Create a work queue.
///
/// `capacity: None` gives an unbounded queue (the default); `Some(n)`
/// bounds it at `n` tasks and blocks the producer when full.
pub fn task_queue(capacity: Option<usize>) -> (TaskSender, TaskReceiver) {
    match capacity {
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (TaskSender::Unbounded(tx), TaskReceiver::Unbounded(rx))
        }
        Some(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (TaskSender::Bounded(tx), TaskReceiver::Bounded(rx))
        }
    }
}

/// Producer handle
#[derive(Clone)]
pub enum TaskSender {
    Bounded(mpsc::Sender<FileTask>),
    Unbounded(mpsc::UnboundedSender<FileTask>),
}

impl TaskSender {
    /// Enqueue a task. Blocks on a full bounded queue (backpressure);
    /// fails only when the consumer side is gone.
    pub async fn send(&self, task: FileTask) -> Result<(), QueueClosed> {
        match self {
            Self::Bounded(tx) => tx.send(task).await.map_err(|_| QueueClosed),
            Self::Unbounded(tx) => tx.send(task).map_err(|_| QueueClosed),
        }
    }
}

/// Consumer handle
pub enum TaskReceiver {
    Bounded(mpsc::Receiver<FileTask>),
    Unbounded(mpsc::UnboundedReceiver<FileTask>),
}

impl TaskReceiver {
    /// Dequeue the next task; `None` once every sender is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<FileTask> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Identities (content hashes) of tasks enqueued but not yet terminal.
///
/// Shared between the watcher (inserts on enqueue) and the dispatcher
/// (removes once the outcome is recorded).
#[derive(Clone, Default)]
pub struct InFlightTracker {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an identity. Returns false if it is already in flight.
    pub fn claim(&self, id: &str) -> bool {
        self.ids
            .lock()
            .expect("in-flight tracker lock poisoned")
            .insert(id.to_string())
    }

    /// Release an identity once its task is terminal.
    pub fn release(&self, id: &str) {
        self.ids
            .lock()
            .expect("in-flight tracker lock poisoned")
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.ids
            .lock()
            .expect("in-flight tracker lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content hash identifying a file delivery (first 12 hex chars of
/// SHA256). Identical bytes re-delivered map to the same task identity;
/// a modified file gets a new one.
pub async fn compute_file_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    let digest = hasher.finalize();

    Ok(hex::encode(digest)[..12].to_string())
}
