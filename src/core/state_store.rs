//! Durable per-dataset-kind dedup state.
//!
//! The state store records which business keys have already been
//! committed downstream. Persistence is an append-only JSONL commit log
//! per dataset kind: each line is a complete commit record carrying the
//! batch's keys and a monotonically increasing version.
//!
//! Recovery contract: on open, each log is replayed in order and replay
//! stops at the first torn line or version gap. Everything after that
//! point is treated as not committed, so those keys are reported unseen
//! and reprocessed on the next delivery. Duplication downstream is
//! bounded and acceptable; silent key loss is not.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::DatasetKind;

/// Durability or consistency failure in the state store
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State directory is locked by another process: {0}")]
    Locked(PathBuf),
}

/// One durably committed batch of keys
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    /// Monotonically increasing per-kind sequence
    version: u64,

    /// When the commit was written
    committed_at: DateTime<Utc>,

    /// Business keys committed by this batch
    keys: Vec<String>,
}

/// In-memory view of one dataset kind's committed state
#[derive(Debug, Default)]
struct KindState {
    version: u64,
    keys: HashSet<String>,
}

impl KindState {
    fn apply(&mut self, record: CommitRecord) {
        self.version = record.version;
        self.keys.extend(record.keys);
    }
}

/// Snapshot of one kind's committed state, for inspection
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub kind: String,
    pub version: u64,
    pub committed_keys: usize,
}

/// Durable, per-dataset-kind record of committed business keys.
///
/// `seen` filters a candidate key set to the unseen subset; `commit`
/// appends the newly committed keys and is durable before it returns.
/// Commits for the same kind are serialized by a per-kind mutex, so two
/// concurrent tasks can never interleave their commits.
#[derive(Debug)]
pub struct StateStore {
    state_dir: PathBuf,

    /// Per-kind state behind per-kind locks
    kinds: std::sync::Mutex<HashMap<String, Arc<Mutex<KindState>>>>,

    /// Exclusive advisory lock held for the store's lifetime
    _lock: std::fs::File,
}

impl StateStore {
    /// Open the state store, replaying every kind's commit log.
    ///
    /// Takes an exclusive lock on the state directory; a second process
    /// opening the same directory gets `StateStoreError::Locked`.
    pub fn open(state_dir: &Path) -> Result<Self, StateStoreError> {
        std::fs::create_dir_all(state_dir)?;

        let lock_path = state_dir.join(".lock");
        let lock = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StateStoreError::Locked(state_dir.to_path_buf()))?;

        let mut kinds = HashMap::new();

        for entry in std::fs::read_dir(state_dir)? {
            let path = entry?.path();

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(kind) = name.strip_suffix(".jsonl") else {
                continue;
            };

            let state = Self::replay(&path)?;
            kinds.insert(kind.to_string(), Arc::new(Mutex::new(state)));
        }

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            kinds: std::sync::Mutex::new(kinds),
            _lock: lock,
        })
    }

    /// Replay one commit log.
    ///
    /// Stops at the first unparseable line or version gap: an in-flight
    /// commit that did not complete before a crash must be treated as
    /// not committed.
    fn replay(path: &Path) -> Result<KindState, StateStoreError> {
        let mut state = KindState::default();

        let content = std::fs::read_to_string(path)?;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let record: CommitRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Torn commit record, treating remainder of log as uncommitted"
                    );
                    break;
                }
            };

            if record.version != state.version + 1 {
                warn!(
                    path = %path.display(),
                    expected = state.version + 1,
                    found = record.version,
                    "Version gap in commit log, treating remainder as uncommitted"
                );
                break;
            }

            state.apply(record);
        }

        Ok(state)
    }

    fn kind_state(&self, kind: &DatasetKind) -> Arc<Mutex<KindState>> {
        let mut kinds = self.kinds.lock().expect("state store lock poisoned");
        kinds
            .entry(kind.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(KindState::default())))
            .clone()
    }

    fn log_path(&self, kind: &DatasetKind) -> PathBuf {
        self.state_dir.join(format!("{}.jsonl", kind.as_str()))
    }

    /// Filter `keys` to the subset not yet committed, preserving order.
    ///
    /// Idempotent: two calls with no interleaved commit return the same
    /// subset.
    pub async fn seen(&self, kind: &DatasetKind, keys: &[String]) -> Vec<String> {
        let state = self.kind_state(kind);
        let state = state.lock().await;

        keys.iter()
            .filter(|k| !state.keys.contains(k.as_str()))
            .cloned()
            .collect()
    }

    /// Durably commit newly-seen keys for a dataset kind.
    ///
    /// Holds the kind's lock across the read-filter-append sequence, so a
    /// concurrent commit for the same kind observes this one's result.
    /// Keys already committed are skipped; if nothing remains the call is
    /// a no-op success. The commit record is fsynced before the in-memory
    /// set is updated, so readers never observe keys that could be lost.
    ///
    /// Returns the number of keys newly committed.
    pub async fn commit(
        &self,
        kind: &DatasetKind,
        keys: &[String],
    ) -> Result<usize, StateStoreError> {
        let state = self.kind_state(kind);
        let mut state = state.lock().await;

        let mut new_keys: Vec<String> = Vec::with_capacity(keys.len());
        let mut batch: HashSet<&str> = HashSet::with_capacity(keys.len());
        for key in keys {
            if !state.keys.contains(key.as_str()) && batch.insert(key.as_str()) {
                new_keys.push(key.clone());
            }
        }

        if new_keys.is_empty() {
            return Ok(0);
        }

        let record = CommitRecord {
            version: state.version + 1,
            committed_at: Utc::now(),
            keys: new_keys.clone(),
        };

        let line = serde_json::to_string(&record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(kind))
            .await?;

        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;

        state.apply(record);

        Ok(new_keys.len())
    }

    /// Current version for a kind (0 if nothing committed)
    pub async fn version(&self, kind: &DatasetKind) -> u64 {
        let state = self.kind_state(kind);
        let state = state.lock().await;
        state.version
    }

    /// Summaries for every known kind, sorted by kind name
    pub async fn summaries(&self) -> Vec<StateSummary> {
        let entries: Vec<(String, Arc<Mutex<KindState>>)> = {
            let kinds = self.kinds.lock().expect("state store lock poisoned");
            kinds
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for (kind, state) in entries {
            let state = state.lock().await;
            summaries.push(StateSummary {
                kind,
                version: state.version,
                committed_keys: state.keys.len(),
            });
        }

        summaries.sort_by(|a, b| a.kind.cmp(&b.kind));
        summaries
    }
}
