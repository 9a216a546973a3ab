//! Per-zoom-level overlay clustering.
//!
//! Overlays are bucketed into a square grid laid over the map pixel space of
//! one discrete zoom level. The first overlay landing in a cell seeds a
//! cluster with a copy of its coordinate; each later arrival folds into the
//! seed's unweighted running average and joins the member list. The average
//! depends on arrival order; that behavior is part of the contract and must
//! not be "corrected" to a weighted centroid.

use std::collections::HashMap;

use crate::coord;

use super::{sort_by_latitude, Overlay, PlacedOverlay};

/// Clusters below this member count dissolve back into individual markers.
pub const MIN_CLUSTER_SIZE: usize = 6;

/// Viewport-derived parameters for one clustering pass.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Base tile size of the pyramid the overlays are projected into.
    pub tile_size: u32,
}

impl ClusterParams {
    /// Grid cell edge: one quarter of the shorter viewport dimension.
    fn grid_step(&self) -> i64 {
        i64::from(self.viewport_width.min(self.viewport_height) / 4).max(1)
    }
}

struct Seed {
    lat: f64,
    lng: f64,
    members: Vec<usize>,
}

/// Builds the clustered entry list for one discrete zoom level.
///
/// `overlays` must already be sorted latitude-descending; member indices in
/// the output refer into that slice. The returned list is re-sorted by
/// latitude. Dissolution of undersized clusters happens in this same pass,
/// never recursively.
pub(super) fn build_level(
    overlays: &[Overlay],
    zoom: u8,
    params: &ClusterParams,
) -> Vec<PlacedOverlay> {
    if overlays.is_empty() {
        return Vec::new();
    }

    let zoom_f = f64::from(zoom);
    let step = params.grid_step();
    let cells_per_column = (coord::map_size(zoom_f, params.tile_size) / step).max(1);

    let mut seeds: Vec<Seed> = Vec::new();
    let mut cell_to_seed: HashMap<i64, usize> = HashMap::new();

    for (i, overlay) in overlays.iter().enumerate() {
        let x = coord::longitude_to_pixel_x(overlay.lng(), zoom_f, params.tile_size);
        let y = coord::latitude_to_pixel_y(overlay.lat(), zoom_f, params.tile_size);
        let cell = (x / step) * cells_per_column + y / step;

        match cell_to_seed.get(&cell) {
            Some(&s) => {
                let seed = &mut seeds[s];
                seed.lat = (seed.lat + overlay.lat()) / 2.0;
                seed.lng = (seed.lng + overlay.lng()) / 2.0;
                seed.members.push(i);
            }
            None => {
                cell_to_seed.insert(cell, seeds.len());
                seeds.push(Seed {
                    lat: overlay.lat(),
                    lng: overlay.lng(),
                    members: vec![i],
                });
            }
        }
    }

    let mut out = Vec::with_capacity(overlays.len());
    for seed in seeds {
        if seed.members.len() < MIN_CLUSTER_SIZE {
            for m in seed.members {
                out.push(PlacedOverlay::single(&overlays[m], m));
            }
        } else {
            let first = &overlays[seed.members[0]];
            out.push(PlacedOverlay::cluster(
                seed.lat,
                seed.lng,
                first.width(),
                first.height(),
                seed.members,
            ));
        }
    }
    sort_by_latitude(&mut out);
    out
}
