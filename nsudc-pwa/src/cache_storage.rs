//! Cache Storage
//!
//! Named cache partitions (the JS `caches` object). Entries are keyed by
//! request identity, method plus absolute URL, and hold the captured status,
//! headers and body.
//!
//! Quota is enforced across all partitions; when a put would exceed it the
//! least recently cached entries are evicted first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::network::{HttpResponse, Method, ResponseType};

// ── Constants ───────────────────────────────────────────────

/// Default maximum cache size across all partitions (25 MB).
pub const DEFAULT_MAX_CACHE_SIZE: usize = 25 * 1024 * 1024;

/// Bytes charged per entry on top of the body for headers and bookkeeping.
const ENTRY_OVERHEAD: usize = 256;

// ── Types ───────────────────────────────────────────────────

/// Request identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A single cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: RequestKey,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub response_type: ResponseType,
    pub cached_at: DateTime<Utc>,
    /// Bytes charged against the quota.
    pub size: usize,
}

impl CachedResponse {
    pub fn from_response(key: RequestKey, response: &HttpResponse, cached_at: DateTime<Utc>) -> Self {
        Self {
            key,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            response_type: response.response_type,
            cached_at,
            size: response.body.len() + ENTRY_OVERHEAD,
        }
    }

    pub fn to_response(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            response_type: self.response_type,
        }
    }
}

/// Cache storage error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No entry for the request. Not user-facing: the caller goes to the
    /// network instead.
    #[error("cache miss: {0}")]
    Miss(RequestKey),

    #[error("cache quota exceeded ({needed} bytes needed, {max} allowed)")]
    QuotaExceeded { needed: usize, max: usize },

    #[error("invalid cache data: {0}")]
    InvalidData(String),
}

/// A named cache partition.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    pub name: String,
    entries: BTreeMap<RequestKey, CachedResponse>,
    total_size: usize,
}

/// All partitions for one origin.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    caches: BTreeMap<String, Cache>,
    max_size: usize,
}

/// Serialized form of [`CacheStorage`].
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    max_size: usize,
    caches: Vec<PartitionSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartitionSnapshot {
    name: String,
    entries: Vec<CachedResponse>,
}

// ── Cache Implementation ────────────────────────────────────

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
            total_size: 0,
        }
    }

    /// Store an entry, replacing any previous one for the same request.
    /// Returns the net change in size.
    fn put(&mut self, response: CachedResponse) -> isize {
        let added = response.size as isize;
        let removed = self
            .entries
            .insert(response.key.clone(), response)
            .map(|old| old.size as isize)
            .unwrap_or(0);
        self.total_size = (self.total_size as isize + added - removed) as usize;
        added - removed
    }

    pub fn match_request(&self, key: &RequestKey) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    pub fn delete(&mut self, key: &RequestKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.total_size = self.total_size.saturating_sub(entry.size);
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> Vec<&RequestKey> {
        self.entries.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> usize {
        self.total_size
    }

    fn oldest(&self) -> Option<&CachedResponse> {
        self.entries.values().min_by_key(|e| e.cached_at)
    }

    /// Evict the least recently cached entry.
    fn evict_lru(&mut self) -> Option<RequestKey> {
        let oldest = self.oldest().map(|e| e.key.clone())?;
        self.delete(&oldest);
        Some(oldest)
    }
}

// ── CacheStorage Implementation ─────────────────────────────

impl CacheStorage {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_MAX_CACHE_SIZE)
    }

    pub fn with_quota(max_size: usize) -> Self {
        Self {
            caches: BTreeMap::new(),
            max_size,
        }
    }

    /// Open (or create) a named cache.
    pub fn open(&mut self, cache_name: &str) -> &mut Cache {
        self.caches
            .entry(cache_name.to_string())
            .or_insert_with(|| Cache::new(cache_name))
    }

    pub fn get(&self, cache_name: &str) -> Option<&Cache> {
        self.caches.get(cache_name)
    }

    pub fn has(&self, cache_name: &str) -> bool {
        self.caches.contains_key(cache_name)
    }

    /// Delete a named cache and everything in it.
    pub fn delete(&mut self, cache_name: &str) -> bool {
        self.caches.remove(cache_name).is_some()
    }

    /// All cache names.
    pub fn keys(&self) -> Vec<&str> {
        self.caches.keys().map(|s| s.as_str()).collect()
    }

    /// Put a response into the named cache, evicting old entries if the
    /// quota would be exceeded.
    pub fn put(&mut self, cache_name: &str, response: CachedResponse) -> Result<(), CacheError> {
        let replaced = self
            .get(cache_name)
            .and_then(|c| c.match_request(&response.key))
            .map(|e| e.size)
            .unwrap_or(0);
        let needed = response.size.saturating_sub(replaced);
        if response.size > self.max_size {
            return Err(CacheError::QuotaExceeded {
                needed: response.size,
                max: self.max_size,
            });
        }
        if self.total_size() + needed > self.max_size {
            self.evict_to_fit(needed)?;
        }
        self.open(cache_name).put(response);
        Ok(())
    }

    /// Match a request across all caches, in name order.
    pub fn match_request(&self, key: &RequestKey) -> Option<(&str, &CachedResponse)> {
        self.caches
            .iter()
            .find_map(|(name, cache)| cache.match_request(key).map(|r| (name.as_str(), r)))
    }

    /// Match a request in the listed caches only, in the given order.
    pub fn match_in_any(&self, cache_names: &[&str], key: &RequestKey) -> Option<&CachedResponse> {
        cache_names
            .iter()
            .find_map(|name| self.caches.get(*name)?.match_request(key))
    }

    /// Match a request in one named cache.
    pub fn match_in(&self, cache_name: &str, key: &RequestKey) -> Option<&CachedResponse> {
        self.caches.get(cache_name)?.match_request(key)
    }

    pub fn total_size(&self) -> usize {
        self.caches.values().map(|c| c.size()).sum()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Evict LRU entries across all caches until `needed` bytes are free.
    fn evict_to_fit(&mut self, needed: usize) -> Result<(), CacheError> {
        while self.total_size() + needed > self.max_size {
            let oldest_cache = self
                .caches
                .iter()
                .filter_map(|(name, c)| c.oldest().map(|e| (name.clone(), e.cached_at)))
                .min_by_key(|(_, at)| *at)
                .map(|(name, _)| name);

            let evicted = oldest_cache
                .and_then(|name| self.caches.get_mut(&name))
                .and_then(|cache| cache.evict_lru());
            if evicted.is_none() {
                break;
            }
        }

        if self.total_size() + needed > self.max_size {
            Err(CacheError::QuotaExceeded {
                needed,
                max: self.max_size,
            })
        } else {
            Ok(())
        }
    }

    // ── Persistence ─────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, CacheError> {
        let snapshot = Snapshot {
            max_size: self.max_size,
            caches: self
                .caches
                .values()
                .map(|c| PartitionSnapshot {
                    name: c.name.clone(),
                    entries: c.entries.values().cloned().collect(),
                })
                .collect(),
        };
        serde_json::to_string(&snapshot).map_err(|e| CacheError::InvalidData(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let snapshot: Snapshot =
            serde_json::from_str(json).map_err(|e| CacheError::InvalidData(e.to_string()))?;
        let mut storage = Self::with_quota(snapshot.max_size);
        for partition in snapshot.caches {
            let cache = storage.open(&partition.name);
            for entry in partition.entries {
                cache.put(entry);
            }
        }
        Ok(storage)
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────
