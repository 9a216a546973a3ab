//! Tile identity and pixel data.
//!
//! A [`TileKey`] addresses one cell of the Web Mercator pyramid; a [`Tile`]
//! carries the decoded pixel buffer for that cell. Tiles are owned by the
//! cache behind an `Arc` — the buffer is freed when the cache drops its
//! reference (eviction or clear) and no caller still holds one.

/// Identity of one tile in the Web Mercator pyramid.
///
/// Valid iff `x < 2^zoom` and `y < 2^zoom`. `x` grows eastward, `y` grows
/// southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Tile column (X coordinate in the Web Mercator grid).
    pub x: u32,
    /// Tile row (Y coordinate in the Web Mercator grid).
    pub y: u32,
    /// Pyramid level.
    pub zoom: u8,
}

impl TileKey {
    /// Creates a new tile key.
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Whether the coordinates lie inside the grid at this zoom level.
    pub fn is_valid(&self) -> bool {
        let side = 1u64 << self.zoom.min(32);
        (self.x as u64) < side && (self.y as u64) < side
    }

    /// The covering tile `step` levels up, plus this tile's offset within
    /// it.
    ///
    /// Returns `None` when fewer than `step` coarser levels exist. The
    /// offset `(dx, dy)` selects which of the `2^step × 2^step` sub-cells of
    /// the ancestor this tile occupies, used to crop a fallback snippet.
    pub fn ancestor(&self, step: u8) -> Option<(TileKey, u32, u32)> {
        if step > self.zoom {
            return None;
        }
        let pow2 = 1u32 << step;
        let key = TileKey::new(self.x / pow2, self.y / pow2, self.zoom - step);
        Some((key, self.x % pow2, self.y % pow2))
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Decoded pixel data for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Tile {
    /// Wraps a decoded pixel buffer.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Tile width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Tile height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The raw pixel buffer.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Buffer size in bytes, used for the cache byte budget.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}
