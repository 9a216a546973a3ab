//! Map view controller.
//!
//! A thin orchestrator wiring the projection, cache, fetch pipeline,
//! overlay index and gesture recognizer to per-frame drawing. The
//! controller runs on a single cooperative context: [`draw`] walks the
//! visible tiles to completion without blocking, and [`pump`] runs between
//! frames to drain fetch deliveries, release withheld taps and advance
//! kinetic scrolling.
//!
//! A draw pass that finds no cached tile never waits: it submits an async
//! fetch and immediately falls back to a snippet of a lower-resolution
//! ancestor (one, then two levels up) or the backend's placeholder.
//!
//! [`draw`]: MapController::draw
//! [`pump`]: MapController::pump

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::TileCache;
use crate::coord::{self, PixelRect};
use crate::gesture::{GestureConfig, GestureIntent, GestureRecognizer, TouchEvent};
use crate::overlay::{
    ClusterParams, Overlay, OverlaySelection, OverlaySpatialIndex, VisibleMarker,
};
use crate::pipeline::{FetchPipeline, PipelineConfig};
use crate::source::{SourceError, TileSource};
use crate::tile::{Tile, TileKey};

/// Fling velocity is divided by this on touch release.
const FLING_DAMPING: f64 = 4.0;

/// Exponential fling friction, per second.
const FLING_FRICTION: f64 = 4.0;

/// Kinetic scrolling stops below this speed (px/s).
const FLING_STOP_VELOCITY: f64 = 20.0;

/// Zoom step applied by the zoom in/out commands before rounding.
const ZOOM_STEP: f64 = 1.25;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Tile cache byte budget.
    pub cache_capacity_bytes: u64,
    pub pipeline: PipelineConfig,
    pub gesture: GestureConfig,
    /// How long to wait for a location fix before notifying once.
    pub location_fix_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: 32 * 1024 * 1024,
            pipeline: PipelineConfig::default(),
            gesture: GestureConfig::default(),
            location_fix_timeout: Duration::from_secs(15),
        }
    }
}

/// Rendering operations the hosting UI layer provides.
///
/// All rectangles are viewport-relative pixels. Implementations must not
/// retain the tile references past the call.
pub trait MapSurface {
    /// Draws a whole tile scaled into `dest`.
    fn draw_tile(&mut self, tile: &Tile, dest: &PixelRect);

    /// Draws the `src` sub-rectangle of `tile` scaled into `dest`, used for
    /// lower-resolution ancestor fallback.
    fn draw_tile_snippet(&mut self, tile: &Tile, src: &PixelRect, dest: &PixelRect);

    /// Draws the route polyline; `points` are the vertices in
    /// viewport-relative pixels, in route order.
    fn draw_route(&mut self, points: &[(i64, i64)]);

    /// Draws an overlay marker or cluster badge; `overlay` carries the
    /// source overlay for single markers.
    fn draw_marker(&mut self, marker: &VisibleMarker, overlay: Option<&Overlay>);

    /// Draws the my-location indicator.
    fn draw_location(&mut self, x: i64, y: i64);
}

type SelectionHandler = Box<dyn FnMut(&OverlaySelection)>;
type LocationNoticeHandler = Box<dyn FnMut()>;

#[derive(Debug)]
struct Fling {
    vx: f64,
    vy: f64,
    /// Sub-pixel scroll remainders carried between frames.
    acc_x: f64,
    acc_y: f64,
    last: Instant,
}

/// Owns one map view's state and wires the subsystems together.
pub struct MapController {
    source: Arc<dyn TileSource>,
    cache: TileCache,
    pipeline: FetchPipeline,
    overlays: OverlaySpatialIndex,
    gestures: GestureRecognizer,
    config: ControllerConfig,

    viewport_width: u32,
    viewport_height: u32,
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    scroll_x: i64,
    scroll_y: i64,

    fling: Option<Fling>,
    route: Vec<(f64, f64)>,
    my_location: Option<(f64, f64)>,
    location_deadline: Option<Instant>,
    on_overlay_selected: Option<SelectionHandler>,
    on_location_notice: Option<LocationNoticeHandler>,
    needs_redraw: bool,
}

impl MapController {
    /// Creates a controller for one viewport; starts the fetch pipeline.
    pub fn new(
        source: Arc<dyn TileSource>,
        config: ControllerConfig,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Result<Self, SourceError> {
        let cache = TileCache::new(config.cache_capacity_bytes);
        let pipeline = FetchPipeline::new(Arc::clone(&source), config.pipeline.clone())?;
        let gestures =
            GestureRecognizer::new(config.gesture, viewport_width, viewport_height);

        let tile_size = source.tile_size();
        let min_zoom = source
            .min_zoom_level()
            .max(coord::min_zoom_level(viewport_width, viewport_height, tile_size));
        let max_zoom = source.max_zoom_level();

        Ok(Self {
            source,
            cache,
            pipeline,
            overlays: OverlaySpatialIndex::new(),
            gestures,
            config,
            viewport_width,
            viewport_height,
            zoom: min_zoom,
            min_zoom,
            max_zoom,
            scroll_x: 0,
            scroll_y: 0,
            fling: None,
            route: Vec::new(),
            my_location: None,
            location_deadline: None,
            on_overlay_selected: None,
            on_location_notice: None,
            needs_redraw: true,
        })
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn scroll(&self) -> (i64, i64) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn set_on_overlay_selected(&mut self, handler: SelectionHandler) {
        self.on_overlay_selected = Some(handler);
    }

    pub fn set_on_location_notice(&mut self, handler: LocationNoticeHandler) {
        self.on_location_notice = Some(handler);
    }

    /// Takes the redraw flag set by deliveries, gestures and commands.
    pub fn take_needs_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    /// Draws one frame: visible tiles (with ancestor fallback), the route
    /// polyline, overlay markers, then the my-location indicator.
    ///
    /// Runs to completion without blocking; missing tiles are requested
    /// asynchronously and degrade to a fallback for this frame.
    pub fn draw(&mut self, surface: &mut dyn MapSurface) {
        let base = self.source.tile_size();
        let tile_px = coord::tile_size_at(self.zoom, base);
        let level = coord::zoom_as_int(self.zoom).clamp(0, 30) as u8;
        let side = 1i64 << level;

        let first_x = (self.scroll_x / tile_px).max(0);
        let first_y = (self.scroll_y / tile_px).max(0);
        let last_x = ((self.scroll_x + i64::from(self.viewport_width) - 1) / tile_px)
            .min(side - 1);
        let last_y = ((self.scroll_y + i64::from(self.viewport_height) - 1) / tile_px)
            .min(side - 1);

        for tile_y in first_y..=last_y {
            for tile_x in first_x..=last_x {
                let key = TileKey::new(tile_x as u32, tile_y as u32, level);
                let dest = PixelRect::new(
                    tile_x * tile_px - self.scroll_x,
                    tile_y * tile_px - self.scroll_y,
                    (tile_x + 1) * tile_px - self.scroll_x,
                    (tile_y + 1) * tile_px - self.scroll_y,
                );
                match self.cache.get(&key) {
                    Some(tile) => surface.draw_tile(&tile, &dest),
                    None => {
                        self.pipeline.request(key);
                        self.draw_fallback(surface, key, &dest, base);
                    }
                }
            }
        }

        self.draw_route(surface, base);
        self.draw_overlays(surface, base);

        if let Some((lat, lng)) = self.my_location {
            let x = coord::longitude_to_pixel_x(lng, self.zoom, base) - self.scroll_x;
            let y = coord::latitude_to_pixel_y(lat, self.zoom, base) - self.scroll_y;
            surface.draw_location(x, y);
        }
    }

    /// Nearest cached ancestor snippet (one, then two levels up), falling
    /// back to the backend's placeholder.
    fn draw_fallback(
        &self,
        surface: &mut dyn MapSurface,
        key: TileKey,
        dest: &PixelRect,
        base: u32,
    ) {
        for step in 1..=2u8 {
            if let Some((ancestor, dx, dy)) = key.ancestor(step) {
                if let Some(tile) = self.cache.get(&ancestor) {
                    let sub = i64::from(base >> step);
                    let src = PixelRect::new(
                        i64::from(dx) * sub,
                        i64::from(dy) * sub,
                        (i64::from(dx) + 1) * sub,
                        (i64::from(dy) + 1) * sub,
                    );
                    surface.draw_tile_snippet(&tile, &src, dest);
                    return;
                }
            }
        }
        surface.draw_tile(&self.source.default_tile(), dest);
    }

    fn draw_route(&self, surface: &mut dyn MapSurface, base: u32) {
        if self.route.len() < 2 {
            return;
        }
        let points: Vec<(i64, i64)> = self
            .route
            .iter()
            .map(|&(lat, lng)| {
                (
                    coord::longitude_to_pixel_x(lng, self.zoom, base) - self.scroll_x,
                    coord::latitude_to_pixel_y(lat, self.zoom, base) - self.scroll_y,
                )
            })
            .collect();
        surface.draw_route(&points);
    }

    fn draw_overlays(&mut self, surface: &mut dyn MapSurface, base: u32) {
        let view = PixelRect::new(
            self.scroll_x,
            self.scroll_y,
            self.scroll_x + i64::from(self.viewport_width),
            self.scroll_y + i64::from(self.viewport_height),
        );
        let markers = match self.overlays.visible(self.zoom, &view, base) {
            Ok(markers) => markers,
            Err(e) => {
                warn!(error = %e, "overlay range query failed");
                return;
            }
        };
        for marker in markers {
            let on_screen = VisibleMarker {
                x: marker.x - self.scroll_x,
                y: marker.y - self.scroll_y,
                rect: PixelRect::new(
                    marker.rect.left - self.scroll_x,
                    marker.rect.top - self.scroll_y,
                    marker.rect.right - self.scroll_x,
                    marker.rect.bottom - self.scroll_y,
                ),
                kind: marker.kind,
            };
            let overlay = match marker.kind {
                crate::overlay::MarkerKind::Single { index } => self.overlays.overlay(index),
                crate::overlay::MarkerKind::Cluster { .. } => None,
            };
            surface.draw_marker(&on_screen, overlay);
        }
    }

    /// Per-frame housekeeping: drains fetch deliveries into the cache,
    /// releases a withheld tap, advances kinetic scrolling, and fires the
    /// one-shot location notice. Returns whether a redraw is needed.
    pub fn pump(&mut self, now: Instant) -> bool {
        while let Some(delivery) = self.pipeline.try_next_delivery() {
            if let Some(tile) = delivery.tile {
                self.cache.put(delivery.key, tile);
                self.needs_redraw = true;
            }
        }

        if let Some(intent) = self.gestures.poll(now) {
            self.apply_intent(intent);
        }

        self.advance_fling(now);

        if let Some(deadline) = self.location_deadline {
            if now >= deadline {
                self.location_deadline = None;
                if self.my_location.is_none() {
                    debug!("no location fix before deadline");
                    if let Some(handler) = self.on_location_notice.as_mut() {
                        handler();
                    }
                }
            }
        }

        self.needs_redraw
    }

    /// Feeds a raw touch event and applies the resulting intents.
    pub fn handle_touch(&mut self, event: TouchEvent) {
        for intent in self.gestures.handle(event) {
            self.apply_intent(intent);
        }
    }

    fn apply_intent(&mut self, intent: GestureIntent) {
        match intent {
            GestureIntent::Pan { dx, dy } => {
                self.fling = None;
                self.scroll_by(-dx.round() as i64, -dy.round() as i64);
            }
            GestureIntent::Zoom { scale, focus } => {
                self.zoom_to(self.zoom * scale, focus.x, focus.y);
            }
            GestureIntent::Tap { pos } => self.on_tap(pos.x, pos.y),
            GestureIntent::DoubleTap { pos } => self.zoom_in(pos.x, pos.y),
            GestureIntent::TwoFingerTap { midpoint } => {
                self.zoom_out(midpoint.x, midpoint.y)
            }
            GestureIntent::Fling { vx, vy } => {
                self.fling = Some(Fling {
                    vx: vx / FLING_DAMPING,
                    vy: vy / FLING_DAMPING,
                    acc_x: 0.0,
                    acc_y: 0.0,
                    last: Instant::now(),
                });
            }
        }
    }

    fn on_tap(&mut self, x: f64, y: f64) {
        let base = self.source.tile_size();
        let map_x = self.scroll_x + x.round() as i64;
        let map_y = self.scroll_y + y.round() as i64;
        let hit = match self.overlays.hit_test(self.zoom, map_x, map_y, base) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "overlay hit test failed");
                return;
            }
        };
        match hit {
            Some(selection @ OverlaySelection::Single { .. }) => {
                if let Some(handler) = self.on_overlay_selected.as_mut() {
                    handler(&selection);
                }
            }
            // Tapping a cluster dives into it instead of selecting.
            Some(OverlaySelection::Cluster { .. }) => self.zoom_in(x, y),
            None => {}
        }
    }

    fn advance_fling(&mut self, now: Instant) {
        let Some(fling) = self.fling.as_mut() else {
            return;
        };
        let dt = now.saturating_duration_since(fling.last).as_secs_f64();
        if dt <= 0.0 {
            return;
        }
        fling.last = now;
        fling.acc_x += fling.vx * dt;
        fling.acc_y += fling.vy * dt;
        let dx = fling.acc_x.trunc();
        let dy = fling.acc_y.trunc();
        fling.acc_x -= dx;
        fling.acc_y -= dy;

        let decay = (-FLING_FRICTION * dt).exp();
        fling.vx *= decay;
        fling.vy *= decay;
        let stopped = fling.vx.abs() < FLING_STOP_VELOCITY
            && fling.vy.abs() < FLING_STOP_VELOCITY;
        if stopped {
            self.fling = None;
        }
        if dx != 0.0 || dy != 0.0 {
            self.scroll_by(dx as i64, dy as i64);
        }
    }

    /// Sets the zoom level, keeping the map point under the focus fixed.
    pub fn zoom_to(&mut self, zoom: f64, focus_x: f64, focus_y: f64) {
        let target = zoom.clamp(self.min_zoom, self.max_zoom);
        if target == self.zoom {
            return;
        }
        let base = self.source.tile_size();
        let old_size = coord::map_size(self.zoom, base) as f64;
        let new_size = coord::map_size(target, base) as f64;
        let scale = new_size / old_size;

        self.scroll_x = ((self.scroll_x as f64 + focus_x) * scale - focus_x).round() as i64;
        self.scroll_y = ((self.scroll_y as f64 + focus_y) * scale - focus_y).round() as i64;
        self.zoom = target;
        self.clamp_scroll();
        self.needs_redraw = true;
        debug!(zoom = self.zoom, "zoom changed");
    }

    /// Zooms one step in, anchored at the given viewport point.
    pub fn zoom_in(&mut self, focus_x: f64, focus_y: f64) {
        self.zoom_to((self.zoom + ZOOM_STEP).round(), focus_x, focus_y);
    }

    /// Zooms one step out, anchored at the given viewport point.
    pub fn zoom_out(&mut self, focus_x: f64, focus_y: f64) {
        self.zoom_to((self.zoom - ZOOM_STEP).round(), focus_x, focus_y);
    }

    /// Centers the viewport on a geographic coordinate.
    pub fn move_to(&mut self, lat: f64, lng: f64) {
        let base = self.source.tile_size();
        let x = coord::longitude_to_pixel_x(lng, self.zoom, base);
        let y = coord::latitude_to_pixel_y(lat, self.zoom, base);
        self.scroll_x = x - i64::from(self.viewport_width) / 2;
        self.scroll_y = y - i64::from(self.viewport_height) / 2;
        self.clamp_scroll();
        self.needs_redraw = true;
    }

    /// Scrolls by a pixel delta, clamped to the map bounds.
    pub fn scroll_by(&mut self, dx: i64, dy: i64) {
        self.scroll_x += dx;
        self.scroll_y += dy;
        self.clamp_scroll();
        self.needs_redraw = true;
    }

    /// Zooms so the given geographic span fits the viewport, keeping the
    /// current center.
    pub fn zoom_to_span(&mut self, lat_span: f64, lng_span: f64) {
        let base = self.source.tile_size();
        let zoom = coord::zoom_for_span(
            lat_span,
            lng_span,
            self.viewport_width,
            self.viewport_height,
            base,
        );
        self.zoom_to(
            zoom,
            f64::from(self.viewport_width) / 2.0,
            f64::from(self.viewport_height) / 2.0,
        );
    }

    /// Handles a viewport resize: recomputes the minimum zoom and re-clamps.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
        self.gestures.set_viewport(width, height);
        let base = self.source.tile_size();
        self.min_zoom = self
            .source
            .min_zoom_level()
            .max(coord::min_zoom_level(width, height, base));
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
        self.clamp_scroll();
        self.needs_redraw = true;
    }

    pub fn add_overlay(&mut self, overlay: Overlay) {
        self.overlays.add(overlay);
    }

    /// Appends a vertex to the route polyline.
    pub fn add_route_point(&mut self, lat: f64, lng: f64) {
        self.route.push((lat, lng));
        self.needs_redraw = true;
    }

    pub fn clear_route(&mut self) {
        self.route.clear();
        self.needs_redraw = true;
    }

    /// (Re)builds the overlay index; with `collapse`, markers cluster per
    /// zoom level.
    pub fn prepare_overlays(&mut self, collapse: bool) {
        let params = ClusterParams {
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            tile_size: self.source.tile_size(),
        };
        let min = self.source.min_zoom_level().max(0.0) as u8;
        let max = self.source.max_zoom_level().clamp(0.0, 30.0) as u8;
        self.overlays.prepare(collapse, min, max, &params);
        self.needs_redraw = true;
    }

    /// Updates the my-location marker and cancels a pending fix deadline.
    pub fn set_my_location(&mut self, lat: f64, lng: f64) {
        self.my_location = Some((lat, lng));
        self.location_deadline = None;
        self.needs_redraw = true;
    }

    /// Starts waiting for a location fix; if none arrives before the
    /// configured timeout, the location-notice handler fires exactly once.
    /// There is no automatic retry.
    pub fn await_location_fix(&mut self, now: Instant) {
        self.location_deadline = Some(now + self.config.location_fix_timeout);
    }

    /// Tears down the fetch pipeline, joining its threads and releasing the
    /// backend.
    pub fn shutdown(mut self) {
        self.pipeline.shutdown();
        self.cache.clear();
    }

    fn clamp_scroll(&mut self) {
        let base = self.source.tile_size();
        let map = coord::map_size(self.zoom, base);
        let max_x = (map - i64::from(self.viewport_width)).max(0);
        let max_y = (map - i64::from(self.viewport_height)).max(0);
        self.scroll_x = self.scroll_x.clamp(0, max_x);
        self.scroll_y = self.scroll_y.clamp(0, max_y);
    }
}


#[cfg(test)]
impl MapController {
    fn scroll_to_origin_for_test(&mut self) {
        self.scroll_x = 0;
        self.scroll_y = 0;
    }
}
