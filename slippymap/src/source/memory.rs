//! In-memory tile backend for tests and offline use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::source::{SourceError, TileSource};
use crate::tile::{Tile, TileKey};

/// Tile backend serving from a fixed in-memory map.
///
/// Fetches can be gated: while the gate is closed, `fetch_tile` blocks,
/// which lets tests hold workers busy and fill the pending queue
/// deterministically. The gate is open by default.
pub struct MemoryTileSource {
    tiles: Mutex<HashMap<TileKey, Tile>>,
    min_zoom: f64,
    max_zoom: f64,
    tile_size: u32,
    default_tile: Arc<Tile>,
    gate_open: Mutex<bool>,
    gate: Condvar,
    fetch_count: AtomicUsize,
    init_count: AtomicUsize,
    release_count: AtomicUsize,
    fetched: Mutex<Vec<TileKey>>,
}

impl MemoryTileSource {
    /// Creates an empty source with the given zoom range and tile size.
    pub fn new(min_zoom: f64, max_zoom: f64, tile_size: u32) -> Self {
        let placeholder = Tile::new(
            tile_size,
            tile_size,
            vec![0u8; (tile_size * tile_size) as usize],
        );
        Self {
            tiles: Mutex::new(HashMap::new()),
            min_zoom,
            max_zoom,
            tile_size,
            default_tile: Arc::new(placeholder),
            gate_open: Mutex::new(true),
            gate: Condvar::new(),
            fetch_count: AtomicUsize::new(0),
            init_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Stores a tile to be served for `key`.
    pub fn insert(&self, key: TileKey, tile: Tile) {
        self.tiles.lock().insert(key, tile);
    }

    /// Closes the fetch gate; subsequent fetches block until [`open_gate`].
    ///
    /// [`open_gate`]: MemoryTileSource::open_gate
    pub fn close_gate(&self) {
        *self.gate_open.lock() = false;
    }

    /// Opens the fetch gate, releasing any blocked fetches.
    pub fn open_gate(&self) {
        let mut open = self.gate_open.lock();
        *open = true;
        self.gate.notify_all();
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Keys fetched so far, in completion order.
    pub fn fetched_keys(&self) -> Vec<TileKey> {
        self.fetched.lock().clone()
    }

    /// How many times `init` has run.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    /// How many times `release` has run.
    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }
}

impl TileSource for MemoryTileSource {
    fn init(&self) -> Result<(), SourceError> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }

    fn fetch_tile(&self, key: TileKey) -> Result<Option<Tile>, SourceError> {
        {
            let mut open = self.gate_open.lock();
            while !*open {
                self.gate.wait(&mut open);
            }
        }
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().push(key);
        Ok(self.tiles.lock().get(&key).cloned())
    }

    fn min_zoom_level(&self) -> f64 {
        self.min_zoom
    }

    fn max_zoom_level(&self) -> f64 {
        self.max_zoom
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn default_tile(&self) -> Arc<Tile> {
        Arc::clone(&self.default_tile)
    }
}
