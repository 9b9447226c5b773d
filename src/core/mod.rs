//! Core orchestration logic.
//!
//! This module contains:
//! - SchemaGate: dataset-shape validation
//! - StateStore: durable per-dataset dedup state
//! - PluginRegistry: extension/kind → plugin bindings
//! - StageSequencer: the ordered stage chain

pub mod registry;
pub mod schema_gate;
pub mod sequencer;
pub mod state_store;

// Re-export commonly used types
pub use registry::PluginRegistry;
pub use schema_gate::{validate, SchemaError, Violation};
pub use sequencer::{StageError, StageSequencer};
pub use state_store::{StateStore, StateStoreError, StateSummary};
