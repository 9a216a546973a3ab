//! Memory-bounded tile cache with strict LRU eviction.
//!
//! The budget is a byte count, not a tile count: inserts evict the
//! least-recently-accessed tiles until the resident total fits. Both `get`
//! and `put` refresh recency. Each evicted tile's buffer is released exactly
//! once — the cache drops its `Arc` and the buffer is freed as soon as no
//! caller still holds a reference. Callers must not retain a returned tile
//! across frames; dereference it within the call that obtained it.
//!
//! Inserts arrive from fetch workers while the render path reads, so the
//! interior state sits behind a `parking_lot::Mutex`. Hit/miss/eviction
//! counters are atomics so a stats snapshot never takes the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::tile::{Tile, TileKey};

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub resident_bytes: u64,
    pub entry_count: usize,
}

struct CacheInner {
    tiles: HashMap<TileKey, Arc<Tile>>,
    /// Access order, oldest first. Linear maintenance is fine at the
    /// few-hundred-entries scale a viewport produces.
    lru: Vec<TileKey>,
    resident_bytes: u64,
}

/// Byte-budgeted LRU store for decoded tiles.
pub struct TileCache {
    inner: Mutex<CacheInner>,
    capacity_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Creates a cache with the given byte budget.
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                tiles: HashMap::new(),
                lru: Vec::new(),
                resident_bytes: 0,
            }),
            capacity_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a tile, refreshing its recency on a hit.
    pub fn get(&self, key: &TileKey) -> Option<Arc<Tile>> {
        let mut inner = self.inner.lock();
        match inner.tiles.get(key).cloned() {
            Some(tile) => {
                inner.lru.retain(|k| k != key);
                inner.lru.push(*key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(tile)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts a tile, evicting least-recently-accessed entries until the
    /// resident total fits the budget.
    ///
    /// Replacing an existing key releases the old buffer. A tile larger than
    /// the entire budget is evicted in the same call, leaving the cache
    /// within budget either way.
    pub fn put(&self, key: TileKey, tile: Tile) {
        let bytes = tile.byte_size() as u64;
        let mut inner = self.inner.lock();

        if let Some(old) = inner.tiles.remove(&key) {
            inner.resident_bytes -= old.byte_size() as u64;
            inner.lru.retain(|k| k != &key);
        }

        inner.tiles.insert(key, Arc::new(tile));
        inner.lru.push(key);
        inner.resident_bytes += bytes;

        while inner.resident_bytes > self.capacity_bytes && !inner.lru.is_empty() {
            let oldest = inner.lru.remove(0);
            if let Some(evicted) = inner.tiles.remove(&oldest) {
                inner.resident_bytes -= evicted.byte_size() as u64;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(tile = %oldest, bytes = evicted.byte_size(), "evicted tile");
            }
        }
    }

    /// Evicts everything, releasing every buffer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let count = inner.tiles.len() as u64;
        inner.tiles.clear();
        inner.lru.clear();
        inner.resident_bytes = 0;
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Current resident total in bytes.
    pub fn resident_bytes(&self) -> u64 {
        self.inner.lock().resident_bytes
    }

    /// Number of resident tiles.
    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    /// Whether the cache holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured byte budget.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            resident_bytes: inner.resident_bytes,
            entry_count: inner.tiles.len(),
        }
    }
}
