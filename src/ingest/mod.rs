//! File ingestion: the producer-consumer front of the pipeline.
//!
//! 1. **Watcher**: monitors the drop directory and enqueues stable files
//! 2. **Queue**: thread-safe FIFO of FileTasks (bounded or unbounded)
//! 3. **Dispatcher**: worker pool running each task through the sequencer
//!
//! ```text
//! drop dir → Watcher → queue → Dispatcher → StageSequencer → outcome
//! ```

pub mod dispatcher;
pub mod queue;
pub mod watcher;

// Re-export key types
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherHandle};
pub use queue::{compute_file_hash, task_queue, InFlightTracker, TaskReceiver, TaskSender};
pub use watcher::{FileWatcher, ScanReport, WatchError, WatchHandle, WatcherConfig};
