//! Tile backend abstraction.
//!
//! A [`TileSource`] supplies decoded tiles on demand — from memory, a tile
//! server, or anything else. The fetch pipeline owns the source for its
//! lifetime: `init` is called once before any fetch, `release` once after
//! the workers have been joined. `fetch_tile` is synchronous and may block;
//! it is only ever invoked from a fetch worker thread, never from the
//! render path.

mod http;
mod memory;

pub use http::{HttpClient, ReqwestClient, XyzTileSource};
pub use memory::MemoryTileSource;

use std::sync::Arc;

use thiserror::Error;

use crate::tile::{Tile, TileKey};

/// Errors from a tile backend.
///
/// A fetch error is logged by the worker and treated as "tile absent"; it is
/// never retried and never surfaced past the placeholder that keeps being
/// drawn.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP transport or status failure.
    #[error("http error: {0}")]
    Http(String),

    /// The fetched bytes could not be decoded into a tile.
    #[error("decode error: {0}")]
    Decode(String),

    /// I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend initialization failed.
    #[error("backend init failed: {0}")]
    Init(String),
}

/// Capability interface for tile backends.
pub trait TileSource: Send + Sync {
    /// One-time initialization, called before any fetch.
    fn init(&self) -> Result<(), SourceError>;

    /// One-time teardown, called after the last fetch has completed.
    fn release(&self);

    /// Fetches one tile. `Ok(None)` means the backend has no tile for this
    /// key; errors are treated the same way by the caller.
    fn fetch_tile(&self, key: TileKey) -> Result<Option<Tile>, SourceError>;

    /// Lowest zoom level the backend can serve.
    fn min_zoom_level(&self) -> f64;

    /// Highest zoom level the backend can serve.
    fn max_zoom_level(&self) -> f64;

    /// Native tile edge length in pixels.
    fn tile_size(&self) -> u32;

    /// Placeholder drawn where no tile is available yet.
    fn default_tile(&self) -> Arc<Tile>;
}
