//! Data directory layout.
//!
//! ```text
//! <data-dir>/
//!   storage.json   key-value storage (draft, queue, last announcement)
//!   caches.json    cache partitions snapshot
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nsudc_pwa::cache_storage::CacheStorage;
use nsudc_pwa::config::SiteConfig;
use nsudc_pwa::web_storage::FileStorage;
use nsudc_pwa::PwaError;

pub const STORAGE_FILE: &str = "storage.json";
pub const CACHE_FILE: &str = "caches.json";

pub fn storage_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STORAGE_FILE)
}

pub fn cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CACHE_FILE)
}

/// Load the site config. A missing file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<SiteConfig, PwaError> {
    match path {
        Some(path) if path.exists() => Ok(SiteConfig::load(path)?),
        Some(path) => {
            warn!("config {} not found, using defaults", path.display());
            Ok(SiteConfig::default())
        }
        None => Ok(SiteConfig::default()),
    }
}

pub fn open_storage(data_dir: &Path, config: &SiteConfig) -> Result<FileStorage, PwaError> {
    fs::create_dir_all(data_dir)?;
    Ok(FileStorage::open_with_quota(
        storage_path(data_dir),
        config.storage.max_bytes,
    )?)
}

/// Read the cache snapshot, or empty partitions when there is none yet.
pub fn read_caches(data_dir: &Path, config: &SiteConfig) -> Result<CacheStorage, PwaError> {
    let path = cache_path(data_dir);
    if !path.exists() {
        debug!("no cache snapshot at {}", path.display());
        return Ok(CacheStorage::with_quota(config.cache.max_bytes));
    }
    let json = fs::read_to_string(&path)?;
    Ok(CacheStorage::from_json(&json)?)
}

/// Write the cache snapshot atomically (temp file + rename).
pub fn write_caches(data_dir: &Path, caches: &CacheStorage) -> Result<(), PwaError> {
    fs::create_dir_all(data_dir)?;
    let path = cache_path(data_dir);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, caches.to_json()?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
