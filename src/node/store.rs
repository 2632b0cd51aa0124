//! Durable storage for the last known node PID
//!
//! The PID survives application restarts so an orphaned node from a
//! previous session can be found and killed before starting a new one.

use super::error::StoreError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key-value store for process ids
pub trait PidStore: Send + Sync {
    /// Read a PID, `None` if absent or zero
    fn get(&self, key: &str) -> Result<Option<u32>, StoreError>;

    fn set(&self, key: &str, pid: u32) -> Result<(), StoreError>;
}

/// PID store backed by a JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store in the user config directory
    pub fn default_location() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Phoenix-Node")
            .join("process-store.json");
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, u32>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

impl PidStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let values = self.read_all()?;
        Ok(values.get(key).copied().filter(|pid| *pid != 0))
    }

    fn set(&self, key: &str, pid: u32) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = self.read_all()?;
        values.insert(key.to_string(), pid);

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(&values).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, contents).map_err(io_err)?;
        Ok(())
    }
}

/// Volatile PID store for local deployments and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PidStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).copied().filter(|pid| *pid != 0))
    }

    fn set(&self, key: &str, pid: u32) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store").join("pids.json");

        JsonFileStore::new(&path).set("TESTNET-PREVIOUS-NODE-PID", 4242).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("TESTNET-PREVIOUS-NODE-PID").unwrap(), Some(4242));
        assert_eq!(reopened.get("MAINNET-PREVIOUS-NODE-PID").unwrap(), None);
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        assert_eq!(store.get("any").unwrap(), None);
    }

    #[test]
    fn test_json_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get("key"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_zero_pid_reads_as_absent() {
        let store = MemoryStore::new();
        store.set("key", 0).unwrap();
        assert_eq!(store.get("key").unwrap(), None);

        store.set("key", 17).unwrap();
        assert_eq!(store.get("key").unwrap(), Some(17));
    }
}
