//! Web Storage
//!
//! Key-value persistence in the shape of `localStorage`. Everything durable
//! in the pipeline (draft, offline queue, last-seen announcement) is a string
//! value under a fixed key in one of these stores.
//!
//! - [`MemoryStorage`]: in-process map with a per-origin quota (5 MB by default)
//! - [`FileStorage`]: the same map persisted as one JSON document on disk,
//!   rewritten atomically on every mutation

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

// ── Constants ───────────────────────────────────────────────

/// Default maximum storage per origin (5 MB, keys + values combined).
pub const DEFAULT_MAX_STORAGE_SIZE: usize = 5 * 1024 * 1024;

// ── Types ───────────────────────────────────────────────────

/// Error type for storage operations.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Key + value would exceed the quota.
    #[error("QuotaExceededError: {needed} bytes requested, {max} allowed")]
    QuotaExceeded { needed: usize, max: usize },

    /// I/O failure during persistence.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value (or the backing document) could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The `localStorage` surface the rest of the crate is written against.
///
/// Methods take `&self`: a single store is shared by the draft store, the
/// submission queue and the service worker, all on one cooperative task.
pub trait KeyValueStore {
    /// Get an item by key.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Set an item, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove an item. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

/// Quota-tracking key → value map shared by both storage backends.
#[derive(Debug, Clone)]
struct StorageArea {
    data: BTreeMap<String, String>,
    current_size: usize,
    max_size: usize,
}

impl StorageArea {
    fn new(max_size: usize) -> Self {
        Self {
            data: BTreeMap::new(),
            current_size: 0,
            max_size,
        }
    }

    fn from_map(data: BTreeMap<String, String>, max_size: usize) -> Self {
        let current_size = data.iter().map(|(k, v)| k.len() + v.len()).sum();
        Self {
            data,
            current_size,
            max_size,
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|s| s.as_str())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let new_entry_size = key.len() + value.len();
        let old_entry_size = self
            .data
            .get(key)
            .map(|v| key.len() + v.len())
            .unwrap_or(0);
        let projected = self.current_size - old_entry_size + new_entry_size;

        if projected > self.max_size {
            return Err(StorageError::QuotaExceeded {
                needed: projected,
                max: self.max_size,
            });
        }

        self.data.insert(key.to_string(), value.to_string());
        self.current_size = projected;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.data.remove(key) {
            Some(value) => {
                self.current_size = self.current_size.saturating_sub(key.len() + value.len());
                true
            }
            None => false,
        }
    }
}

// ── MemoryStorage ───────────────────────────────────────────

/// In-memory storage with quota enforcement.
#[derive(Debug)]
pub struct MemoryStorage {
    area: RefCell<StorageArea>,
}

impl MemoryStorage {
    /// Create an empty store with the default 5 MB quota.
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_MAX_STORAGE_SIZE)
    }

    /// Create an empty store with a custom quota in bytes.
    pub fn with_quota(max_size: usize) -> Self {
        Self {
            area: RefCell::new(StorageArea::new(max_size)),
        }
    }

    /// Number of items.
    pub fn length(&self) -> usize {
        self.area.borrow().data.len()
    }

    /// Current byte usage.
    pub fn size(&self) -> usize {
        self.area.borrow().current_size
    }

    /// Clear all items.
    pub fn clear(&self) {
        let mut area = self.area.borrow_mut();
        area.data.clear();
        area.current_size = 0;
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.area.borrow().get(key).map(str::to_string))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.area.borrow_mut().set(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.area.borrow_mut().remove(key);
        Ok(())
    }
}

// ── FileStorage ─────────────────────────────────────────────

/// Storage persisted as a single JSON object (`{"key": "value", ...}`).
///
/// The document is loaded once on open; every mutation rewrites it through a
/// temp file + rename so a crash never leaves a half-written document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    area: RefCell<StorageArea>,
}

impl FileStorage {
    /// Open (or lazily create) the document at `path`.
    ///
    /// A missing file is an empty store. An unreadable document is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::open_with_quota(path, DEFAULT_MAX_STORAGE_SIZE)
    }

    /// Open with a custom quota in bytes.
    pub fn open_with_quota(path: impl Into<PathBuf>, max_size: usize) -> Result<Self, StorageError> {
        let path = path.into();
        let area = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let data: BTreeMap<String, String> = if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            };
            StorageArea::from_map(data, max_size)
        } else {
            StorageArea::new(max_size)
        };

        Ok(Self {
            path,
            area: RefCell::new(area),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, area: &StorageArea) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(&area.data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.area.borrow().get(key).map(str::to_string))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut staged = self.area.borrow().clone();
        staged.set(key, value)?;
        self.persist(&staged)?;
        *self.area.borrow_mut() = staged;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut staged = self.area.borrow().clone();
        if !staged.remove(key) {
            return Ok(());
        }
        self.persist(&staged)?;
        *self.area.borrow_mut() = staged;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────
