//! Overlay spatial index: a latitude-sorted marker store supporting
//! viewport range queries, tap hit-testing and per-zoom clustering.
//!
//! The index is a 1-D structure over a 2-D domain: entries are kept sorted
//! by latitude descending, a viewport's pixel-Y bounds convert to a latitude
//! band located by binary search, and pixel-X filtering is a linear scan
//! within that slice. This is acceptable under roughly uniform longitudinal
//! density, which holds for typical marker sets.
//!
//! All operations run on the controller context only; the index needs no
//! internal synchronization.

mod cluster;

pub use cluster::{ClusterParams, MIN_CLUSTER_SIZE};

use std::any::Any;
use std::collections::HashMap;

use tracing::debug;

use crate::coord::{self, PixelRect, ProjectionError};

/// A point marker: a WGS84 coordinate, a marker size in pixels, and an
/// opaque payload owned by the embedding application.
pub struct Overlay {
    lat: f64,
    lng: f64,
    width: u32,
    height: u32,
    payload: Box<dyn Any + Send + Sync>,
}

impl Overlay {
    pub fn new(
        lat: f64,
        lng: f64,
        width: u32,
        height: u32,
        payload: Box<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            lat,
            lng,
            width,
            height,
            payload,
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Marker width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Marker height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn payload(&self) -> &(dyn Any + Send + Sync) {
        self.payload.as_ref()
    }
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("lat", &self.lat)
            .field("lng", &self.lng)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedPixel {
    zoom: f64,
    x: i64,
    y: i64,
}

/// What an index entry stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacedKind {
    /// One source overlay, by index into the prepared overlay list.
    Single(usize),
    /// A synthetic cluster; member indices into the prepared overlay list.
    Cluster { members: Vec<usize> },
}

/// One entry of a per-zoom index list.
///
/// Carries its own copy of the coordinate (clusters never alias a source
/// overlay) and a lazily computed pixel position tagged with the zoom it was
/// projected for; a query at a different zoom recomputes it.
#[derive(Debug)]
pub struct PlacedOverlay {
    lat: f64,
    lng: f64,
    width: u32,
    height: u32,
    kind: PlacedKind,
    cached: Option<CachedPixel>,
}

impl PlacedOverlay {
    fn single(overlay: &Overlay, index: usize) -> Self {
        Self {
            lat: overlay.lat,
            lng: overlay.lng,
            width: overlay.width,
            height: overlay.height,
            kind: PlacedKind::Single(index),
            cached: None,
        }
    }

    fn cluster(lat: f64, lng: f64, width: u32, height: u32, members: Vec<usize>) -> Self {
        Self {
            lat,
            lng,
            width,
            height,
            kind: PlacedKind::Cluster { members },
            cached: None,
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn kind(&self) -> &PlacedKind {
        &self.kind
    }

    pub fn member_count(&self) -> usize {
        match &self.kind {
            PlacedKind::Single(_) => 1,
            PlacedKind::Cluster { members } => members.len(),
        }
    }

    fn position(&mut self, zoom: f64, tile_size: u32) -> (i64, i64) {
        if let Some(cached) = self.cached {
            if cached.zoom == zoom {
                return (cached.x, cached.y);
            }
        }
        let x = coord::longitude_to_pixel_x(self.lng, zoom, tile_size);
        let y = coord::latitude_to_pixel_y(self.lat, zoom, tile_size);
        self.cached = Some(CachedPixel { zoom, x, y });
        (x, y)
    }

    /// Marker rectangle for a projected position, anchored bottom-center
    /// (the coordinate sits at the tip of the pin).
    fn marker_rect(&self, x: i64, y: i64) -> PixelRect {
        let w = i64::from(self.width);
        let h = i64::from(self.height);
        PixelRect::new(x - w / 2, y - h, x - w / 2 + w, y)
    }
}

/// An index entry visible in the queried viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleMarker {
    /// Projected anchor position in map pixels.
    pub x: i64,
    pub y: i64,
    /// Marker rectangle in map pixels.
    pub rect: PixelRect,
    pub kind: MarkerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Single { index: usize },
    Cluster { member_count: usize },
}

/// Result of a tap hit-test.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlaySelection {
    /// Index into the prepared overlay list.
    Single { index: usize },
    /// A cluster marker; member indices into the prepared overlay list.
    Cluster {
        lat: f64,
        lng: f64,
        members: Vec<usize>,
    },
}

/// Latitude-sorted overlay store with per-zoom clustered views.
#[derive(Debug, Default)]
pub struct OverlaySpatialIndex {
    /// Source overlays; sorted latitude-descending by [`prepare`].
    ///
    /// [`prepare`]: OverlaySpatialIndex::prepare
    raw: Vec<Overlay>,
    /// Unclustered entries, serving every zoom level without its own list.
    flat: Vec<PlacedOverlay>,
    /// Clustered entries per discrete zoom level.
    levels: HashMap<u8, Vec<PlacedOverlay>>,
}

impl OverlaySpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an overlay. Not visible to queries until the next [`prepare`].
    ///
    /// [`prepare`]: OverlaySpatialIndex::prepare
    pub fn add(&mut self, overlay: Overlay) {
        self.raw.push(overlay);
    }

    /// The prepared overlay at `index` (as referenced by query results).
    pub fn overlay(&self, index: usize) -> Option<&Overlay> {
        self.raw.get(index)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.flat.clear();
        self.levels.clear();
    }

    /// (Re)builds the query structures.
    ///
    /// Sorts the overlays latitude-descending, then, when `collapse` is set,
    /// builds one clustered list per discrete zoom level in
    /// `min_zoom..max_zoom`. The maximum zoom level always serves the raw
    /// sorted list, as does every level when `collapse` is off.
    ///
    /// Previously returned overlay indices are invalidated by the re-sort.
    pub fn prepare(&mut self, collapse: bool, min_zoom: u8, max_zoom: u8, params: &ClusterParams) {
        self.raw
            .sort_by(|a, b| b.lat.total_cmp(&a.lat).then(a.lng.total_cmp(&b.lng)));
        self.flat = self
            .raw
            .iter()
            .enumerate()
            .map(|(i, o)| PlacedOverlay::single(o, i))
            .collect();
        self.levels.clear();
        if collapse {
            for zoom in min_zoom..max_zoom {
                self.levels
                    .insert(zoom, cluster::build_level(&self.raw, zoom, params));
            }
        }
        debug!(
            overlays = self.raw.len(),
            collapse,
            levels = self.levels.len(),
            "overlay index prepared"
        );
    }

    /// Entries whose marker intersects the viewport, at the given zoom.
    ///
    /// The viewport is in absolute map pixels at `zoom`. Entries come back
    /// in latitude-descending order.
    pub fn visible(
        &mut self,
        zoom: f64,
        view: &PixelRect,
        tile_size: u32,
    ) -> Result<Vec<VisibleMarker>, ProjectionError> {
        if self.raw.is_empty() {
            return Ok(Vec::new());
        }
        let map_size = coord::map_size(zoom, tile_size);
        // Pad the band by the tallest marker so anchors just below the
        // viewport still contribute their rectangle.
        let entries = level_entries(&mut self.levels, &mut self.flat, level_of(zoom));
        let pad = max_marker_extent(entries);
        let lat_max =
            coord::pixel_y_to_latitude((view.top - pad).clamp(0, map_size), zoom, tile_size)?;
        let lat_min =
            coord::pixel_y_to_latitude((view.bottom + pad).clamp(0, map_size), zoom, tile_size)?;

        let range = band_range(entries, lat_max, lat_min);
        let mut out = Vec::new();
        for entry in &mut entries[range] {
            let (x, y) = entry.position(zoom, tile_size);
            let rect = entry.marker_rect(x, y);
            if rect.right < view.left || rect.left > view.right {
                continue;
            }
            out.push(VisibleMarker {
                x,
                y,
                rect,
                kind: match &entry.kind {
                    PlacedKind::Single(index) => MarkerKind::Single { index: *index },
                    PlacedKind::Cluster { members } => MarkerKind::Cluster {
                        member_count: members.len(),
                    },
                },
            });
        }
        Ok(out)
    }

    /// Finds the entry under a tap, in absolute map pixels at `zoom`.
    ///
    /// Among entries whose marker rectangle contains the point, the one with
    /// the minimum squared distance from rectangle center to the point wins.
    pub fn hit_test(
        &mut self,
        zoom: f64,
        tap_x: i64,
        tap_y: i64,
        tile_size: u32,
    ) -> Result<Option<OverlaySelection>, ProjectionError> {
        if self.raw.is_empty() {
            return Ok(None);
        }
        let map_size = coord::map_size(zoom, tile_size);
        let entries = level_entries(&mut self.levels, &mut self.flat, level_of(zoom));
        let pad = max_marker_extent(entries);
        let lat_max =
            coord::pixel_y_to_latitude((tap_y - pad).clamp(0, map_size), zoom, tile_size)?;
        let lat_min =
            coord::pixel_y_to_latitude((tap_y + pad).clamp(0, map_size), zoom, tile_size)?;

        let range = band_range(entries, lat_max, lat_min);
        let mut best: Option<(i64, &PlacedOverlay)> = None;
        for entry in &mut entries[range] {
            let (x, y) = entry.position(zoom, tile_size);
            let rect = entry.marker_rect(x, y);
            if !rect.contains(tap_x, tap_y) {
                continue;
            }
            let (cx, cy) = rect.center();
            let dist_sq = (cx - tap_x).pow(2) + (cy - tap_y).pow(2);
            if best.as_ref().map_or(true, |(d, _)| dist_sq < *d) {
                best = Some((dist_sq, entry));
            }
        }
        Ok(best.map(|(_, entry)| match &entry.kind {
            PlacedKind::Single(index) => OverlaySelection::Single { index: *index },
            PlacedKind::Cluster { members } => OverlaySelection::Cluster {
                lat: entry.lat,
                lng: entry.lng,
                members: members.clone(),
            },
        }))
    }
}

fn level_of(zoom: f64) -> u8 {
    coord::zoom_as_int(zoom).clamp(0, 255) as u8
}

/// The entry list serving a discrete zoom level.
///
/// Split-borrow helper: the clustered list when one was built, otherwise the
/// shared unclustered list.
fn level_entries<'a>(
    levels: &'a mut HashMap<u8, Vec<PlacedOverlay>>,
    flat: &'a mut Vec<PlacedOverlay>,
    zoom: u8,
) -> &'a mut Vec<PlacedOverlay> {
    if let Some(list) = levels.get_mut(&zoom) {
        list
    } else {
        flat
    }
}

/// Largest marker dimension among the entries, as band-query padding.
fn max_marker_extent(entries: &[PlacedOverlay]) -> i64 {
    entries
        .iter()
        .map(|e| i64::from(e.width.max(e.height)))
        .max()
        .unwrap_or(0)
}

/// Index range of entries whose latitude lies in `[lat_min, lat_max]`.
///
/// `entries` must be sorted latitude-descending.
fn band_range(entries: &[PlacedOverlay], lat_max: f64, lat_min: f64) -> std::ops::Range<usize> {
    let start = entries.partition_point(|e| e.lat > lat_max);
    let end = entries.partition_point(|e| e.lat >= lat_min);
    start..end.max(start)
}

pub(crate) fn sort_by_latitude(entries: &mut [PlacedOverlay]) {
    entries.sort_by(|a, b| b.lat.total_cmp(&a.lat).then(a.lng.total_cmp(&b.lng)));
}
