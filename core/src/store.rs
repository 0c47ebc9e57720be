//! Key-value persistence for the session record.
//!
//! # Design
//! The client never touches global storage; it is handed a `SessionStore` at
//! construction. Methods take `&self` so one store can back several clients
//! (through a clone of `MemoryStore`, a shared reference, or an `Arc`).

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::warn;

/// Errors raised by a `SessionStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store file {} is not a JSON object of strings: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode session record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// String key-value capability used to persist the session.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing a key that does not exist succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: SessionStore + ?Sized> SessionStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// In-memory store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a map of strings half
    // updated, so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file, e.g. `session.json` in a cache
/// directory. A missing file reads as an empty store.
///
/// Writes go to a temporary file that is renamed over the store file. A
/// corrupt file is reported by `get` but overwritten by `set` and `remove`,
/// so signing in again or logging out repairs it.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
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

    /// Entries to start a mutation from. A corrupt file is discarded.
    fn entries_for_update(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match self.read_entries() {
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!(error = %e, "Discarding corrupt session store");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let contents = serde_json::to_string_pretty(entries).map_err(StoreError::Encode)?;

        let temp_path = self.temp_path();
        if let Err(e) = std::fs::write(&temp_path, contents) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_error(&temp_path)(e));
        }
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_error(&self.path)(e));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("session");
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StoreError::Corrupt { .. }) => {
                warn!(path = %self.path.display(), "Removing corrupt session store");
                return std::fs::remove_file(&self.path).map_err(|source| StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
            Err(e) => return Err(e),
        };
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::Cell;

    use super::*;

    /// `MemoryStore` that fails writes to a chosen key, or all removals.
    #[derive(Default)]
    pub(crate) struct FlakyStore {
        pub(crate) inner: MemoryStore,
        fail_set: Cell<Option<&'static str>>,
        fail_remove: Cell<bool>,
    }

    impl FlakyStore {
        pub(crate) fn fail_set_on(&self, key: &'static str) {
            self.fail_set.set(Some(key));
        }

        pub(crate) fn fail_removals(&self) {
            self.fail_remove.set(true);
        }

        fn injected() -> StoreError {
            StoreError::Io {
                path: PathBuf::from("flaky"),
                source: io::Error::new(io::ErrorKind::Other, "injected failure"),
            }
        }
    }

    impl SessionStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_set.get() == Some(key) {
                return Err(Self::injected());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            if self.fail_remove.get() {
                return Err(Self::injected());
            }
            self.inner.remove(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v").unwrap();
        assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
        other.remove("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_remove_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("absent").is_ok());
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn file_store_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        assert_eq!(store.get("tma_token").unwrap(), None);
        assert!(store.remove("tma_token").is_ok());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        FileStore::new(&path).set("tma_token", "abc").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("tma_token").unwrap().as_deref(), Some("abc"));

        reopened.remove("tma_token").unwrap();
        assert_eq!(FileStore::new(&path).get("tma_token").unwrap(), None);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let err = FileStore::new(&path).get("tma_token").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn file_store_set_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"tma_tok"#).unwrap();

        let store = FileStore::new(&path);
        store.set("tma_token", "fresh").unwrap();
        assert_eq!(store.get("tma_token").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn file_store_remove_deletes_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"tma_tok"#).unwrap();

        let store = FileStore::new(&path);
        store.remove("tma_token").unwrap();
        assert!(!path.exists());
        assert_eq!(store.get("tma_token").unwrap(), None);
    }

    #[test]
    fn file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
    }

    #[test]
    fn memory_store_survives_poisoned_lock() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        let clone = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.entries.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(store.entries.is_poisoned());
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn arc_store_forwards() {
        let store = Arc::new(MemoryStore::new());
        SessionStore::set(&store, "k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
