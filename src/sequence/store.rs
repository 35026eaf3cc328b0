//! Durable sequence storage.
//!
//! Sequences persist as one JSON object mapping name to step list. The
//! file is rewritten atomically (temp file + rename) on every mutation,
//! so a crash mid-write never corrupts the store.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{SequenceError, StoreError};

use super::Step;

pub const STORE_FILE: &str = "sequences.json";

/// Thread-safe, file-backed collection of named sequences.
pub struct SequenceStore {
    path: PathBuf,
    sequences: Mutex<BTreeMap<String, Vec<Step>>>,
}

impl SequenceStore {
    /// Load the store from `path`; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let sequences = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Read(e)),
        };
        debug!(path = %path.display(), "loaded sequence store");
        Ok(Self {
            path,
            sequences: Mutex::new(sequences),
        })
    }

    /// In-memory store for tests and ephemeral sessions.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            sequences: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.sequences
            .lock()
            .expect("store lock")
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Vec<Step>> {
        self.sequences.lock().expect("store lock").get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sequences.lock().expect("store lock").contains_key(name)
    }

    pub fn step_count(&self, name: &str) -> usize {
        self.sequences
            .lock()
            .expect("store lock")
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Start a recording: register an empty sequence under `name`.
    pub fn register(&self, name: &str) -> Result<(), SequenceError> {
        {
            let mut sequences = self.sequences.lock().expect("store lock");
            if sequences.contains_key(name) {
                return Err(SequenceError::AlreadyExists(name.to_string()));
            }
            sequences.insert(name.to_string(), Vec::new());
        }
        self.persist();
        Ok(())
    }

    /// Append a recorded line to an in-progress sequence. Returns the new
    /// step count.
    pub fn append_step(&self, name: &str, cmd: Vec<String>) -> Result<usize, SequenceError> {
        let count = {
            let mut sequences = self.sequences.lock().expect("store lock");
            let steps = sequences
                .get_mut(name)
                .ok_or_else(|| SequenceError::NotFound(name.to_string()))?;
            steps.push(Step::numbered(steps.len() + 1, cmd));
            steps.len()
        };
        self.persist();
        Ok(count)
    }

    /// Finalize a recording; an empty sequence cannot be kept.
    pub fn finalize(&self, name: &str) -> Result<(), SequenceError> {
        {
            let sequences = self.sequences.lock().expect("store lock");
            let steps = sequences
                .get(name)
                .ok_or_else(|| SequenceError::NotFound(name.to_string()))?;
            if steps.is_empty() {
                return Err(SequenceError::Empty(name.to_string()));
            }
        }
        self.persist();
        Ok(())
    }

    /// Drop a sequence (unfinalized recording cleanup, or explicit delete).
    pub fn discard(&self, name: &str) {
        let removed = self
            .sequences
            .lock()
            .expect("store lock")
            .remove(name)
            .is_some();
        if removed {
            self.persist();
        }
    }

    fn persist(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = self.write_atomic() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist sequences");
        }
    }

    fn write_atomic(&self) -> Result<(), StoreError> {
        let json = {
            let sequences = self.sequences.lock().expect("store lock");
            serde_json::to_string_pretty(&*sequences)?
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(StoreError::Write)?;
        tmp.write_all(json.as_bytes()).map_err(StoreError::Write)?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Write(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_finalize_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);

        let store = SequenceStore::load(&path).unwrap();
        store.register("seqA").unwrap();
        store.append_step("seqA", toks(&["get", "users"])).unwrap();
        store.finalize("seqA").unwrap();

        let reloaded = SequenceStore::load(&path).unwrap();
        let steps = reloaded.get("seqA").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "step #1");
        assert_eq!(steps[0].cmd, toks(&["get", "users"]));
    }

    #[test]
    fn test_discard_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);

        let store = SequenceStore::load(&path).unwrap();
        store.register("seqA").unwrap();
        store.append_step("seqA", toks(&["get", "users"])).unwrap();
        store.discard("seqA");

        let reloaded = SequenceStore::load(&path).unwrap();
        assert!(reloaded.get("seqA").is_none());
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let store = SequenceStore::in_memory();
        store.register("seqA").unwrap();
        assert!(matches!(
            store.register("seqA"),
            Err(SequenceError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_finalize_empty_rejected() {
        let store = SequenceStore::in_memory();
        store.register("seqA").unwrap();
        assert!(matches!(
            store.finalize("seqA"),
            Err(SequenceError::Empty(_))
        ));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SequenceStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.names().is_empty());
    }
}
