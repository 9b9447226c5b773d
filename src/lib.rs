//! datalift - file-ingestion pipeline daemon
//!
//! Files dropped into a watched directory are validated against declared
//! schemas, deduplicated against durable per-dataset state, transformed,
//! materialized as local columnar artifacts, and published downstream.
//!
//! # Architecture
//!
//! The system is a producer-consumer pipeline:
//! - The watcher detects stable inbound files and enqueues FileTasks
//! - Dispatcher workers run each task through the ordered stage chain
//! - The state store records committed business keys, so re-delivered
//!   records are never loaded twice, even across restarts
//!
//! A failure in one task never reaches the watcher or other tasks, and
//! state is committed only after the downstream store confirms the
//! artifact, so a crash can cause a redundant re-publish but never
//! silent data loss.
//!
//! # Modules
//!
//! - `ingest`: watcher, work queue, dispatcher
//! - `core`: schema gate, state store, registries, stage sequencer
//! - `plugins`: extractor/transformer/writer/publisher/alerter seams
//! - `domain`: data structures (FileTask, Record, SchemaDefinition)
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Watch and process until interrupted
//! datalift run
//!
//! # One-shot sweep of the drop directory
//! datalift scan
//!
//! # Inspect committed dedup state
//! datalift state customer
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod plugins;

// Re-export main types at crate root for convenience
pub use core::{PluginRegistry, SchemaError, StageError, StageSequencer, StateStore};
pub use domain::{
    Artifact, DatasetKind, FileTask, PipelineOutcome, Record, SchemaCatalog, SchemaDefinition,
    Stage,
};
pub use ingest::{Dispatcher, FileWatcher, InFlightTracker, WatcherConfig};
