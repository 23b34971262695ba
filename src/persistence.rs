//! Whole-collection document persistence.
//!
//! Both the template store and the rate governor keep their entire state in
//! one JSON array that is rewritten on every mutation. [`JsonFileStore`]
//! writes to a temp file in the target directory and renames it over the old
//! document, so a crash mid-write never leaves a truncated file behind.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::EngineError;

/// Load/save access to a whole collection of `T`.
pub trait DocumentStore<T>: Send + Sync {
    /// Returns an empty collection when nothing has been saved yet.
    fn load(&self) -> Result<Vec<T>, EngineError>;
    fn save(&self, items: &[T]) -> Result<(), EngineError>;
}

/// JSON array on disk.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_failed(&self, source: std::io::Error) -> EngineError {
        EngineError::PersistenceWriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl<T> DocumentStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Vec<T>, EngineError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EngineError::PersistenceReadFailed {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| EngineError::Corrupted {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, items: &[T]) -> Result<(), EngineError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.write_failed(e))?;

        let json = serde_json::to_vec_pretty(items)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.write_failed(e))?;
        tmp.write_all(&json).map_err(|e| self.write_failed(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_failed(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_failed(e.error))?;

        tracing::debug!(path = %self.path.display(), count = items.len(), "Document saved");
        Ok(())
    }
}

/// In-memory document, for tests and throwaway runs.
pub struct MemoryStore<T> {
    items: Mutex<Vec<T>>,
    fail_writes: bool,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            fail_writes: false,
        }
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
            fail_writes: false,
        }
    }

    /// A store whose every `save` fails, for exercising write-error paths.
    pub fn failing() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            fail_writes: true,
        }
    }
}

impl<T> DocumentStore<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<Vec<T>, EngineError> {
        let items = self
            .items
            .lock()
            .map_err(|_| EngineError::LockPoisoned("memory store"))?;
        Ok(items.clone())
    }

    fn save(&self, items: &[T]) -> Result<(), EngineError> {
        if self.fail_writes {
            return Err(EngineError::PersistenceWriteFailed {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other("writes disabled"),
            });
        }
        let mut stored = self
            .items
            .lock()
            .map_err(|_| EngineError::LockPoisoned("memory store"))?;
        *stored = items.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                name: "a".into(),
                count: 1,
            },
            Item {
                name: "b".into(),
                count: 2,
            },
        ]
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFileStore<Item> = JsonFileStore::new(dir.path().join("nothing.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("items.json"));
        store.save(&items()).unwrap();
        assert_eq!(store.load().unwrap(), items());
    }

    #[test]
    fn save_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("items.json"));
        store.save(&items()).unwrap();
        store.save(&items()[..1]).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);

        // Only the document itself remains; no stray temp files.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn garbage_file_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, "{not json").unwrap();
        let store: JsonFileStore<Item> = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(EngineError::Corrupted { .. })));
    }

    #[test]
    fn failing_memory_store_surfaces_write_error() {
        let store: MemoryStore<Item> = MemoryStore::failing();
        let err = store.save(&items()).unwrap_err();
        assert!(matches!(err, EngineError::PersistenceWriteFailed { .. }));
    }
}
