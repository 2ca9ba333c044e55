//! Read-through cache for derived file content (match lists, parse results).
//!
//! Entries are keyed by `(path, label)` and remember the xxh3 hash of the
//! content they were computed from. Every lookup re-reads the file and
//! purges the entry when the hash no longer matches, so a hit is never
//! stale. LRU bounded, TTL expired, and files above `max_file_bytes` are
//! never cached.

use crate::edit::content_hash;
use crate::error::PatchError;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

type Key = (PathBuf, String);

struct Entry<V> {
    payload: V,
    content_hash: u64,
    inserted_at: Instant,
    last_access: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_purges: u64,
    pub expired: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct Inner<V> {
    entries: LruCache<Key, Entry<V>>,
    stats: CacheStats,
}

pub struct ContentCache<V> {
    inner: Mutex<Inner<V>>,
    ttl: Option<Duration>,
    max_file_bytes: u64,
}

fn key(path: &Path, label: &str) -> Key {
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    (path, label.to_string())
}

impl<V: Clone> ContentCache<V> {
    /// `ttl` of `None` disables expiry.
    pub fn new(capacity: usize, ttl: Option<Duration>, max_file_bytes: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
            max_file_bytes,
        }
    }

    fn expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        self.ttl.is_some_and(|ttl| now.duration_since(entry.inserted_at) >= ttl)
    }

    /// Lookup against already-read content. Stale and expired entries are
    /// purged before anything else happens.
    fn lookup(&self, key: &Key, hash: u64) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let (stale, expired) = match inner.entries.peek(key) {
            Some(entry) => (entry.content_hash != hash, self.expired(entry, now)),
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };
        if stale || expired {
            inner.entries.pop(key);
            if stale {
                inner.stats.stale_purges += 1;
                debug!(target: "safe_patcher::cache", path = %key.0.display(), label = %key.1, "purged stale entry");
            } else {
                inner.stats.expired += 1;
            }
            inner.stats.misses += 1;
            return None;
        }

        inner.stats.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.last_access = now;
        Some(entry.payload.clone())
    }

    /// Cached value for `(path, label)` if the file still hashes the same.
    pub fn get(&self, path: &Path, label: &str) -> Option<V> {
        let key = key(path, label);
        match std::fs::read(path) {
            Ok(bytes) => self.lookup(&key, content_hash(&bytes)),
            Err(_) => {
                let mut inner = self.inner.lock();
                if inner.entries.pop(&key).is_some() {
                    inner.stats.stale_purges += 1;
                }
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Record `payload` as derived from `content`. Oversized content is
    /// ignored.
    pub fn insert(&self, path: &Path, label: &str, content: &str, payload: V) {
        if content.len() as u64 > self.max_file_bytes {
            return;
        }
        let now = Instant::now();
        let key = key(path, label);
        let entry = Entry {
            payload,
            content_hash: content_hash(content.as_bytes()),
            inserted_at: now,
            last_access: now,
        };
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
            }
        }
    }

    /// Read `path`, serve `(path, label)` from cache when valid, otherwise
    /// run `compute` on the content and cache its result.
    pub fn read_through<F>(&self, path: &Path, label: &str, compute: F) -> Result<V, PatchError>
    where
        F: FnOnce(&str) -> Result<V, PatchError>,
    {
        let content = std::fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
        let key = key(path, label);
        if let Some(hit) = self.lookup(&key, content_hash(content.as_bytes())) {
            return Ok(hit);
        }
        let value = compute(&content)?;
        self.insert(path, label, &content, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, path: &Path, label: &str) {
        self.inner.lock().entries.pop(&key(path, label));
    }

    /// Drop every label cached for `path`.
    pub fn invalidate_path(&self, path: &Path) {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut inner = self.inner.lock();
        let doomed: Vec<Key> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.0 == path)
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            inner.entries.pop(&k);
        }
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let doomed: Vec<Key> = inner
            .entries
            .iter()
            .filter(|(_, e)| self.expired(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            inner.entries.pop(k);
        }
        inner.stats.expired += doomed.len() as u64;
        doomed.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time since `(path, label)` was last served or inserted.
    pub fn idle_for(&self, path: &Path, label: &str) -> Option<Duration> {
        let inner = self.inner.lock();
        inner.entries.peek(&key(path, label)).map(|e| e.last_access.elapsed())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}
