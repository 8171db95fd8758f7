//! # statestore
//!
//! Durable persistence of per-(machine, step) provisioning state.
//!
//! The contract the rest of the system relies on: a [`StateStore::put`]
//! is durable before it returns. The action runner persists every step
//! transition before moving to the next step, so a crash after step N
//! leaves state that accurately reflects steps 1..N and a rerun resumes
//! where the crashed run stopped.
//!
//! Two implementations:
//!
//! - [`FileStore`] - one JSON document per machine under a state
//!   directory, written via temp file + fsync + atomic rename
//! - [`MemoryStore`] - in-memory map for tests
//!
//! Records are keyed by (machine, step id). Distinct machines never
//! share a key, so parallel machine workers only contend on the store's
//! internal lock, never on each other's records.

pub mod error;
pub mod types;

pub use error::{Result, StoreError};
pub use types::{RunRecord, StepStatus};

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable key-value storage of run records.
///
/// Implementations must serialize concurrent writers internally;
/// callers share a store across machine workers.
pub trait StateStore: Send + Sync {
    /// Last recorded state for a (machine, step) pair, if any.
    fn get(&self, machine: &str, step_id: &str) -> Result<Option<RunRecord>>;

    /// Record state for a (machine, step) pair. Durable on return.
    fn put(&self, machine: &str, step_id: &str, record: RunRecord) -> Result<()>;

    /// Clear one step of a machine, or all of its steps, forcing
    /// re-execution on the next run.
    fn reset(&self, machine: &str, step_id: Option<&str>) -> Result<()>;

    /// All records for a machine, keyed by step id.
    fn records_for(&self, machine: &str) -> Result<BTreeMap<String, RunRecord>>;

    /// Machines with any recorded state.
    fn machines(&self) -> Result<Vec<String>>;
}

// ============================================================================
// File-backed store
// ============================================================================

/// File-backed store: one JSON document per machine under `dir`.
///
/// Writes go through a temp file, `sync_all`, then an atomic rename,
/// so a crash mid-write leaves the previous document intact.
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the machine documents
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn machine_path(&self, machine: &str) -> Result<PathBuf> {
        if machine.is_empty() || machine.contains(['/', '\\']) || machine.starts_with('.') {
            return Err(StoreError::InvalidKey {
                name: machine.to_string(),
            });
        }
        Ok(self.dir.join(format!("{machine}.json")))
    }

    fn read_machine(&self, path: &Path) -> Result<BTreeMap<String, RunRecord>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_machine(&self, path: &Path, records: &BTreeMap<String, RunRecord>) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(records)?.as_bytes())?;
            // Durability contract: the record must survive a crash
            // before the runner proceeds to the next step.
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl StateStore for FileStore {
    fn get(&self, machine: &str, step_id: &str) -> Result<Option<RunRecord>> {
        let path = self.machine_path(machine)?;
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self.read_machine(&path)?.remove(step_id))
    }

    fn put(&self, machine: &str, step_id: &str, record: RunRecord) -> Result<()> {
        let path = self.machine_path(machine)?;
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut records = self.read_machine(&path)?;
        records.insert(step_id.to_string(), record);
        self.write_machine(&path, &records)?;
        log::debug!("recorded {machine}/{step_id}");
        Ok(())
    }

    fn reset(&self, machine: &str, step_id: Option<&str>) -> Result<()> {
        let path = self.machine_path(machine)?;
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match step_id {
            Some(id) => {
                let mut records = self.read_machine(&path)?;
                if records.remove(id).is_some() {
                    self.write_machine(&path, &records)?;
                }
            }
            None => {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }

    fn records_for(&self, machine: &str) -> Result<BTreeMap<String, RunRecord>> {
        let path = self.machine_path(machine)?;
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.read_machine(&path)
    }

    fn machines(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store for tests. Same semantics as
/// [`FileStore`], minus durability.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, BTreeMap<String, RunRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, machine: &str, step_id: &str) -> Result<Option<RunRecord>> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(inner.get(machine).and_then(|m| m.get(step_id)).cloned())
    }

    fn put(&self, machine: &str, step_id: &str, record: RunRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .entry(machine.to_string())
            .or_default()
            .insert(step_id.to_string(), record);
        Ok(())
    }

    fn reset(&self, machine: &str, step_id: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match step_id {
            Some(id) => {
                if let Some(records) = inner.get_mut(machine) {
                    records.remove(id);
                }
            }
            None => {
                inner.remove(machine);
            }
        }
        Ok(())
    }

    fn records_for(&self, machine: &str) -> Result<BTreeMap<String, RunRecord>> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(inner.get(machine).cloned().unwrap_or_default())
    }

    fn machines(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut names: Vec<String> = inner.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
