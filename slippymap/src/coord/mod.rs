//! Web Mercator projection math.
//!
//! Converts between geographic coordinates (latitude/longitude in WGS84
//! degrees), absolute map pixel coordinates, and tile indices at a given
//! zoom level. The zoom level is real-valued: the fractional part scales the
//! rendered tile size continuously so that zooming between integer pyramid
//! levels does not jump.
//!
//! Every dependent module (clustering, hit-testing, the draw pass) relies on
//! these exact formulas and their rounding behavior. Changing them breaks
//! overlay range queries, so they are centralized here.

use std::f64::consts::PI;

use thiserror::Error;

/// Maximum longitude in degrees.
pub const LONGITUDE_MAX: f64 = 180.0;

/// Minimum longitude in degrees.
pub const LONGITUDE_MIN: f64 = -LONGITUDE_MAX;

/// Maximum latitude representable in Web Mercator (pole singularity bound).
pub const LATITUDE_MAX: f64 = 85.05112877980659;

/// Minimum latitude representable in Web Mercator.
pub const LATITUDE_MIN: f64 = -LATITUDE_MAX;

/// Errors from inverse pixel conversions.
///
/// These indicate a programming error in the caller (a pixel coordinate that
/// cannot exist on the map at the given zoom level) and are surfaced
/// immediately rather than recovered.
#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    /// Pixel X coordinate outside `[0, map_size]`.
    #[error("invalid pixel x coordinate at zoom level {zoom}: {pixel}")]
    PixelXOutOfRange { pixel: i64, zoom: f64 },

    /// Pixel Y coordinate outside `[0, map_size]`.
    #[error("invalid pixel y coordinate at zoom level {zoom}: {pixel}")]
    PixelYOutOfRange { pixel: i64, zoom: f64 },
}

/// Axis-aligned rectangle in absolute map pixel coordinates.
///
/// `right` and `bottom` are inclusive for containment checks, matching how
/// marker rectangles and tile destinations are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl PixelRect {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Whether the point lies inside this rectangle.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Center point, rounded toward the top-left.
    pub fn center(&self) -> (i64, i64) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

/// Rounds a real-valued zoom level to its discrete pyramid level.
#[inline]
pub fn zoom_as_int(zoom: f64) -> i32 {
    zoom.round() as i32
}

/// Rendered tile size in pixels at a real-valued zoom level.
///
/// The fractional part `f` of the zoom scales the base tile size:
/// `f < 0.5` scales by `1 + f` (growing toward the next level), otherwise by
/// `0.5 * (1 + f)` (shrinking, because [`zoom_as_int`] has already rounded
/// up to the next pyramid level). The result is continuous in `zoom`.
#[inline]
pub fn tile_size_at(zoom: f64, base_tile_size: u32) -> i64 {
    let f = zoom - zoom.floor();
    let f = if f < 0.5 { f + 1.0 } else { 0.5 * (f + 1.0) };
    (base_tile_size as f64 * f) as i64
}

/// Total map size in pixels along one axis at a real-valued zoom level.
#[inline]
pub fn map_size(zoom: f64, base_tile_size: u32) -> i64 {
    (1i64 << zoom_as_int(zoom).max(0)) * tile_size_at(zoom, base_tile_size)
}

/// Projects a longitude to an absolute pixel X coordinate.
pub fn longitude_to_pixel_x(longitude: f64, zoom: f64, base_tile_size: u32) -> i64 {
    let map_size = map_size(zoom, base_tile_size) as f64;
    ((longitude + 180.0) / 360.0 * map_size).round() as i64
}

/// Projects a latitude to an absolute pixel Y coordinate.
///
/// The latitude is clamped to `±`[`LATITUDE_MAX`] before projection to stay
/// clear of the pole singularity.
pub fn latitude_to_pixel_y(latitude: f64, zoom: f64, base_tile_size: u32) -> i64 {
    let latitude = latitude.clamp(LATITUDE_MIN, LATITUDE_MAX);
    let sin_latitude = (latitude * (PI / 180.0)).sin();
    let map_size = map_size(zoom, base_tile_size) as f64;
    ((0.5 - ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln() / (4.0 * PI)) * map_size).round()
        as i64
}

/// Inverse projection: absolute pixel X back to longitude.
///
/// # Errors
///
/// Returns [`ProjectionError::PixelXOutOfRange`] when `pixel_x` lies outside
/// `[0, map_size]` at this zoom level.
pub fn pixel_x_to_longitude(
    pixel_x: i64,
    zoom: f64,
    base_tile_size: u32,
) -> Result<f64, ProjectionError> {
    let map_size = map_size(zoom, base_tile_size);
    if pixel_x < 0 || pixel_x > map_size {
        return Err(ProjectionError::PixelXOutOfRange {
            pixel: pixel_x,
            zoom,
        });
    }
    Ok(360.0 * pixel_x as f64 / map_size as f64 - 180.0)
}

/// Inverse projection: absolute pixel Y back to latitude.
///
/// # Errors
///
/// Returns [`ProjectionError::PixelYOutOfRange`] when `pixel_y` lies outside
/// `[0, map_size]` at this zoom level.
pub fn pixel_y_to_latitude(
    pixel_y: i64,
    zoom: f64,
    base_tile_size: u32,
) -> Result<f64, ProjectionError> {
    let map_size = map_size(zoom, base_tile_size);
    if pixel_y < 0 || pixel_y > map_size {
        return Err(ProjectionError::PixelYOutOfRange {
            pixel: pixel_y,
            zoom,
        });
    }
    let y = 0.5 - pixel_y as f64 / map_size as f64;
    Ok(90.0 - 360.0 * (-y * (2.0 * PI)).exp().atan() / PI)
}

/// Converts an absolute pixel coordinate to a tile index.
#[inline]
pub fn pixel_to_tile(pixel: i64, tile_size: i64) -> i64 {
    pixel / tile_size
}

/// Minimum zoom level at which the map covers a viewport of the given size.
pub fn min_zoom_level(width: u32, height: u32, base_tile_size: u32) -> f64 {
    let max = width.max(height);
    let tiles_count = (max as f64 / base_tile_size as f64).ceil();
    (tiles_count.ln() / 2f64.ln()).ceil()
}

/// Zoom level at which a geographic span fits a viewport.
///
/// Picks the smaller of the zooms that fit the longitude span horizontally
/// and the latitude span vertically.
pub fn zoom_for_span(
    lat_span: f64,
    lng_span: f64,
    width: u32,
    height: u32,
    base_tile_size: u32,
) -> f64 {
    let zoom_w = (360.0 * width as f64 / base_tile_size as f64 / lng_span).log2();
    let zoom_h =
        ((LATITUDE_MAX - LATITUDE_MIN) * height as f64 / base_tile_size as f64 / lat_span).log2();
    zoom_w.min(zoom_h)
}
