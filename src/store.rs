//! Persistent scoped string store: get / set / remove by key.
//!
//! Two backends:
//!   - `MemoryStore`: process lifetime only (tests, or no writable location).
//!   - `FileStore`  : a single JSON object file of `key -> string`, rewritten
//!                    through a temp file + rename on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, instrument};

use crate::error::CoreError;

pub trait ScopedStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
  fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
  fn remove(&self, key: &str) -> Result<(), CoreError>;
}

fn poisoned() -> CoreError {
  CoreError::StorageUnavailable("store lock poisoned".into())
}

#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ScopedStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
    Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
    self.entries.lock().map_err(|_| poisoned())?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), CoreError> {
    self.entries.lock().map_err(|_| poisoned())?.remove(key);
    Ok(())
  }
}

pub struct FileStore {
  path: PathBuf,
  entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
  /// Open (or create) the store file. An unreadable or corrupt file is an error;
  /// the caller decides whether to fall back to memory.
  #[instrument(level = "info", fields(path = %path.display()))]
  pub fn open(path: &Path) -> Result<Self, CoreError> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| CoreError::StorageUnavailable(format!("cannot create {}: {}", parent.display(), e)))?;
      }
    }
    let entries = match std::fs::read_to_string(path) {
      Ok(s) if s.trim().is_empty() => BTreeMap::new(),
      Ok(s) => serde_json::from_str::<BTreeMap<String, String>>(&s)
        .map_err(|e| CoreError::StorageUnavailable(format!("corrupt store {}: {}", path.display(), e)))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(CoreError::StorageUnavailable(format!("cannot read {}: {}", path.display(), e))),
    };
    debug!(target: "autosave", keys = entries.len(), "Opened file store");
    Ok(Self { path: path.to_path_buf(), entries: Mutex::new(entries) })
  }

  fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), CoreError> {
    let body = serde_json::to_string_pretty(entries)
      .map_err(|e| CoreError::StorageUnavailable(format!("cannot serialize store: {}", e)))?;
    let tmp = self.path.with_extension("json.writing");
    std::fs::write(&tmp, body)
      .map_err(|e| CoreError::StorageUnavailable(format!("cannot write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, &self.path)
      .map_err(|e| CoreError::StorageUnavailable(format!("cannot replace {}: {}", self.path.display(), e)))
  }
}

impl ScopedStore for FileStore {
  fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
    Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
    let mut entries = self.entries.lock().map_err(|_| poisoned())?;
    let previous = entries.insert(key.to_string(), value.to_string());
    if let Err(e) = self.flush(&entries) {
      // Keep memory consistent with disk.
      match previous {
        Some(p) => entries.insert(key.to_string(), p),
        None => entries.remove(key),
      };
      return Err(e);
    }
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), CoreError> {
    let mut entries = self.entries.lock().map_err(|_| poisoned())?;
    if entries.remove(key).is_some() {
      self.flush(&entries)?;
    }
    Ok(())
  }
}
