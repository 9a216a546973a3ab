//! Slippymap - interactive raster map viewer core
//!
//! This library provides the engine behind a tiled Web Mercator map view:
//! projection math, a byte-budgeted tile cache, an asynchronous deduplicated
//! fetch pipeline, an overlay index with per-zoom clustering, a multi-touch
//! gesture recognizer, and a controller wiring them to per-frame drawing.
//!
//! The hosting UI supplies rendering through [`MapSurface`] and tiles
//! through a [`TileSource`] backend; everything else lives here.

pub mod cache;
pub mod controller;
pub mod coord;
pub mod gesture;
pub mod overlay;
pub mod pipeline;
pub mod source;
pub mod tile;

pub use cache::{CacheStats, TileCache};
pub use controller::{ControllerConfig, MapController, MapSurface};
pub use coord::{PixelRect, ProjectionError};
pub use gesture::{GestureConfig, GestureIntent, GestureRecognizer, Pointer, TouchEvent};
pub use overlay::{ClusterParams, Overlay, OverlaySelection, OverlaySpatialIndex};
pub use pipeline::{FetchPipeline, PipelineConfig, TileDelivery};
pub use source::{HttpClient, MemoryTileSource, ReqwestClient, SourceError, TileSource, XyzTileSource};
pub use tile::{Tile, TileKey};
