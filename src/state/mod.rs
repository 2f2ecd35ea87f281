//! Durable per-endpoint state
//!
//! [`StateStore`] is the single writer of [`EndpointState`] records. It keeps
//! every record in a sharded in-memory map for lock-free reads across
//! endpoints and writes each record through to a [`StateBackend`] so it
//! survives restarts.

pub mod file;
pub mod memory;
pub mod prune;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use prune::PruneWorker;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::monitor::{EndpointState, Status};

/// Storage medium for serialized state records, keyed by endpoint URL
pub trait StateBackend: Send + Sync {
    /// Replace the record for a key. Readers must never observe a partial write.
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Read the record for a key
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Remove the record for a key (no-op when absent)
    fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    /// Every stored record, each paired with a label naming where it came from
    fn read_all(&self) -> Result<Vec<(String, Vec<u8>)>, PersistenceError>;

    /// Flush pending writes to durable storage
    fn sync(&self) -> Result<(), PersistenceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background write failed: {0}")]
    Task(String),
}

/// On-disk shape of a state record
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    url: String,
    state: EndpointState,
}

/// Count of endpoints by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub unknown: usize,
}

impl FromIterator<Status> for StatusSummary {
    fn from_iter<I: IntoIterator<Item = Status>>(statuses: I) -> Self {
        let mut summary = StatusSummary::default();
        for status in statuses {
            summary.total += 1;
            match status {
                Status::Up => summary.up += 1,
                Status::Down => summary.down += 1,
                Status::Unknown => summary.unknown += 1,
            }
        }
        summary
    }
}

/// Per-endpoint state with write-through persistence
pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    states: DashMap<String, EndpointState>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StateStore {
    /// Open a store and load every persisted record.
    ///
    /// Each record carries its own URL, so backends are free to store it under
    /// any name. Records that fail to decode are logged and skipped; their
    /// endpoints start again from UNKNOWN. Failing to list the backend is fatal.
    pub fn open(backend: Arc<dyn StateBackend>) -> Result<Self, PersistenceError> {
        let states = DashMap::new();

        for (source, data) in backend.read_all()? {
            match serde_json::from_slice::<StoredRecord>(&data) {
                Ok(record) => {
                    states.insert(record.url, record.state);
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Failed to decode state record");
                }
            }
        }

        tracing::info!("Loaded state for {} endpoints", states.len());

        Ok(Self {
            backend,
            states,
            write_locks: DashMap::new(),
        })
    }

    /// Store backed only by memory; state is lost on exit
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            states: DashMap::new(),
            write_locks: DashMap::new(),
        }
    }

    /// Current state for an endpoint, UNKNOWN if it was never saved
    pub fn load(&self, url: &str) -> EndpointState {
        self.states
            .get(url)
            .map(|state| state.value().clone())
            .unwrap_or_default()
    }

    /// Record a new state for an endpoint.
    ///
    /// The in-memory copy is replaced even when the durable write fails, so
    /// the rest of this run keeps comparing against the computed state. The
    /// error is still returned for the caller to report.
    pub fn save(&self, url: &str, state: EndpointState) -> Result<(), PersistenceError> {
        let lock = self.write_lock(url);
        let _guard = lock.lock();

        let record = StoredRecord {
            url: url.to_string(),
            state,
        };
        let result = serde_json::to_vec_pretty(&record)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))
            .and_then(|data| self.backend.write(url, &data));

        self.states.insert(record.url, record.state);
        result
    }

    /// Forget everything known about an endpoint. Returns whether a record existed.
    pub fn reset(&self, url: &str) -> Result<bool, PersistenceError> {
        let lock = self.write_lock(url);
        let _guard = lock.lock();

        self.backend.delete(url)?;
        let existed = self.states.remove(url).is_some();
        if existed {
            tracing::info!(url = %url, "Reset endpoint state");
        }
        Ok(existed)
    }

    /// Remove records not checked since `cutoff`. Returns how many were removed.
    pub fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let stale: Vec<String> = self
            .states
            .iter()
            .filter(|entry| is_stale(entry.value(), cutoff))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for url in stale {
            let lock = self.write_lock(&url);
            let _guard = lock.lock();

            // Re-check under the lock; the endpoint may have been probed since
            let still_stale = self
                .states
                .get(&url)
                .map(|state| is_stale(state.value(), cutoff))
                .unwrap_or(false);
            if !still_stale {
                continue;
            }

            self.backend.delete(&url)?;
            self.states.remove(&url);
            tracing::info!(url = %url, "Pruned stale endpoint state");
            removed += 1;
        }
        Ok(removed)
    }

    /// Flush the backend to durable storage
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.backend.sync()
    }

    fn write_lock(&self, url: &str) -> Arc<Mutex<()>> {
        // Clone out of the map so the shard lock is released before waiting
        self.write_locks
            .entry(url.to_string())
            .or_default()
            .value()
            .clone()
    }
}

fn is_stale(state: &EndpointState, cutoff: DateTime<Utc>) -> bool {
    state
        .last_checked_at
        .map(|checked| checked < cutoff)
        .unwrap_or(false)
}
