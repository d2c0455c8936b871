// THEORY:
// The `crop_selector` turns each final cluster into a crop window in full-frame
// coordinates, ready to be cut out of the RGB capture and handed to a classifier.
//
// Key architectural principles:
// 1.  **Scale First**: Clusters live in mask space. Every coordinate is multiplied by
//     the sizing factor before it is compared against the full frame.
// 2.  **Two Window Sources**: A cluster whose scaled bounding box is wider *and* taller
//     than the fixed window is cropped by its box. Anything smaller gets a fixed
//     `window_size` square centered on its mass center, so small insects still reach
//     the classifier with context around them. `CropStrategy` can also force either
//     source.
// 3.  **Shift, Then Clip**: A window that runs off one edge is slid back inside,
//     keeping its size, so a mass center 5 pixels from the left edge still yields a
//     full 224-pixel window starting at 0. Only a window larger than the frame itself
//     is clipped to the frame. The result always satisfies `x0 < x1 <= width` and
//     `y0 < y1 <= height`.

use crate::core_modules::cluster::{Cluster, ClusterSet};
use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Side length of the fixed crop window, in full-frame pixels.
pub const CROP_WINDOW: u32 = 224;

/// Which window source the selector may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStrategy {
    /// Bounding box when it exceeds the window on both axes, mass center otherwise.
    #[default]
    Adaptive,
    /// Always crop the bounding box.
    BoundingBox,
    /// Always crop a fixed window around the mass center.
    MassCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropParams {
    pub strategy: CropStrategy,
    pub window_size: u32,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            strategy: CropStrategy::Adaptive,
            window_size: CROP_WINDOW,
        }
    }
}

/// Where a crop window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropSource {
    BoundingBox,
    MassCenter,
}

/// A crop window in full-frame coordinates. `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    /// Position of the source cluster in the final cluster set.
    pub cluster_index: usize,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub width: u32,
    pub height: u32,
    pub source: CropSource,
}

/// Chooses one crop window per final cluster, in cluster order.
pub fn select_crops(
    clusters: &ClusterSet,
    sizing_factor: u32,
    frame_width: u32,
    frame_height: u32,
    params: &CropParams,
) -> DetectionResult<Vec<CropRegion>> {
    if sizing_factor == 0 {
        return Err(DetectionError::InvalidConfig(
            "sizing factor must be at least 1".to_string(),
        ));
    }
    if frame_width == 0 || frame_height == 0 || params.window_size == 0 {
        return Err(DetectionError::InvalidGeometry {
            operation: "select_crops",
            requested_width: params.window_size,
            requested_height: params.window_size,
            source_width: frame_width,
            source_height: frame_height,
        });
    }

    let regions: Vec<CropRegion> = clusters
        .iter()
        .enumerate()
        .map(|(cluster_index, cluster)| {
            select_crop(cluster_index, cluster, sizing_factor, frame_width, frame_height, params)
        })
        .collect();

    for region in &regions {
        debug!(
            cluster = region.cluster_index,
            x0 = region.x0,
            y0 = region.y0,
            x1 = region.x1,
            y1 = region.y1,
            source = ?region.source,
            "crop selected"
        );
    }
    Ok(regions)
}

fn select_crop(
    cluster_index: usize,
    cluster: &Cluster,
    sizing_factor: u32,
    frame_width: u32,
    frame_height: u32,
    params: &CropParams,
) -> CropRegion {
    let scale = sizing_factor as i64;
    let b = cluster.bounding_box;
    let (bx0, mut bx1) = (b.min_col as i64 * scale, b.max_col as i64 * scale);
    let (by0, mut by1) = (b.min_row as i64 * scale, b.max_row as i64 * scale);
    let window = params.window_size as i64;

    let use_box = match params.strategy {
        CropStrategy::Adaptive => bx1 - bx0 > window && by1 - by0 > window,
        CropStrategy::BoundingBox => true,
        CropStrategy::MassCenter => false,
    };

    let (x0, x1, y0, y1, source) = if use_box {
        // A box flat on one axis still covers the mask cell it sits in.
        if bx1 <= bx0 {
            bx1 = bx0 + scale;
        }
        if by1 <= by0 {
            by1 = by0 + scale;
        }
        let (x0, x1) = clamp_span(bx0, bx1, frame_width);
        let (y0, y1) = clamp_span(by0, by1, frame_height);
        (x0, x1, y0, y1, CropSource::BoundingBox)
    } else {
        let half = window / 2;
        let center_x = cluster.mass_center.col as i64 * scale;
        let center_y = cluster.mass_center.row as i64 * scale;
        let (x0, x1) = clamp_span(center_x - half, center_x - half + window, frame_width);
        let (y0, y1) = clamp_span(center_y - half, center_y - half + window, frame_height);
        (x0, x1, y0, y1, CropSource::MassCenter)
    };

    CropRegion {
        cluster_index,
        x0,
        y0,
        x1,
        y1,
        width: x1 - x0,
        height: y1 - y0,
        source,
    }
}

/// Fits `[start, end)` inside `[0, limit)`, sliding it inward to keep its length and
/// clipping only when it is longer than `limit`. Requires `end > start`, `limit > 0`.
fn clamp_span(start: i64, end: i64, limit: u32) -> (u32, u32) {
    let limit = limit as i64;
    let len = end - start;
    let (start, end) = if len >= limit {
        (0, limit)
    } else if start < 0 {
        (0, len)
    } else if end > limit {
        (limit - len, limit)
    } else {
        (start, end)
    };
    (start as u32, end as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::cluster::BoundingBox;
    use crate::core_modules::location_extractor::Location;

    const WIDTH: u32 = 1920;
    const HEIGHT: u32 = 1080;

    fn cluster(center: (u16, u16), bbox: BoundingBox) -> Cluster {
        Cluster {
            index: 0,
            mass_center: Location::new(center.0, center.1),
            member_count: 1,
            bounding_box: bbox,
        }
    }

    fn one(cluster: Cluster, sizing_factor: u32, params: &CropParams) -> CropRegion {
        let mut set = ClusterSet::new();
        set.push(cluster).unwrap();
        let regions = select_crops(&set, sizing_factor, WIDTH, HEIGHT, params).unwrap();
        assert_eq!(regions.len(), 1);
        regions[0]
    }

    #[test]
    fn small_cluster_gets_centered_window() {
        let c = cluster((100, 200), BoundingBox::new(95, 105, 190, 210));
        let region = one(c, 4, &CropParams::default());
        assert_eq!(region.source, CropSource::MassCenter);
        assert_eq!((region.x0, region.x1), (800 - 112, 800 + 112));
        assert_eq!((region.y0, region.y1), (400 - 112, 400 + 112));
        assert_eq!((region.width, region.height), (224, 224));
    }

    #[test]
    fn window_near_left_edge_slides_inward() {
        let c = cluster((100, 5), BoundingBox::new(100, 100, 5, 5));
        let region = one(c, 1, &CropParams::default());
        assert_eq!((region.x0, region.x1), (0, 224));
        assert_eq!(region.width, 224);
    }

    #[test]
    fn window_near_far_edges_slides_inward() {
        let c = cluster((268, 478), BoundingBox::new(268, 268, 478, 478));
        let region = one(c, 4, &CropParams::default());
        assert_eq!((region.x0, region.x1), (WIDTH - 224, WIDTH));
        assert_eq!((region.y0, region.y1), (HEIGHT - 224, HEIGHT));
    }

    #[test]
    fn large_box_is_cropped_directly() {
        let c = cluster((100, 100), BoundingBox::new(20, 150, 30, 200));
        let region = one(c, 4, &CropParams::default());
        assert_eq!(region.source, CropSource::BoundingBox);
        assert_eq!((region.x0, region.x1, region.y0, region.y1), (120, 800, 80, 600));
        assert_eq!((region.width, region.height), (680, 520));
    }

    #[test]
    fn box_large_on_one_axis_only_uses_mass_center() {
        let c = cluster((100, 100), BoundingBox::new(95, 105, 10, 200));
        let region = one(c, 4, &CropParams::default());
        assert_eq!(region.source, CropSource::MassCenter);
    }

    #[test]
    fn forced_box_strategy_widens_flat_boxes() {
        let params = CropParams {
            strategy: CropStrategy::BoundingBox,
            ..CropParams::default()
        };
        let c = cluster((10, 10), BoundingBox::new(10, 10, 10, 12));
        let region = one(c, 4, &params);
        assert_eq!(region.source, CropSource::BoundingBox);
        assert_eq!((region.x0, region.x1, region.y0, region.y1), (40, 48, 40, 44));
    }

    #[test]
    fn forced_center_strategy_ignores_large_boxes() {
        let params = CropParams {
            strategy: CropStrategy::MassCenter,
            ..CropParams::default()
        };
        let c = cluster((100, 100), BoundingBox::new(20, 150, 30, 200));
        assert_eq!(one(c, 4, &params).source, CropSource::MassCenter);
    }

    #[test]
    fn window_larger_than_frame_is_clipped() {
        let mut set = ClusterSet::new();
        set.push(cluster((10, 10), BoundingBox::new(10, 10, 10, 10))).unwrap();
        let regions = select_crops(&set, 1, 100, 80, &CropParams::default()).unwrap();
        assert_eq!((regions[0].x0, regions[0].x1), (0, 100));
        assert_eq!((regions[0].y0, regions[0].y1), (0, 80));
    }

    #[test]
    fn empty_set_yields_no_crops() {
        let regions = select_crops(&ClusterSet::new(), 4, WIDTH, HEIGHT, &CropParams::default());
        assert!(regions.unwrap().is_empty());
    }

    #[test]
    fn zero_sizing_factor_is_rejected() {
        let result = select_crops(&ClusterSet::new(), 0, WIDTH, HEIGHT, &CropParams::default());
        assert!(matches!(result, Err(DetectionError::InvalidConfig(_))));
    }
}
