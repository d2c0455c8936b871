// THEORY:
// The `location_extractor` scans a downsampled 0/1 foreground mask and keeps only the
// foreground pixels that sit inside a dense patch of foreground, suppressing isolated
// noise pixels before clustering.
//
// The density test is directional: for pixel `(row, col)` it sums the `window` mask
// values immediately to the right and the `window` values immediately below, and keeps
// the pixel when that sum exceeds `min_count`. Only pixels with
// `col + window <= width` and `row + window <= height` are considered. Looking only
// right and down biases detections toward the top-left of each blob. Downstream crop
// sizes were tuned with that bias, so it stays.
//
// Output is bounded. At most `max_locations` are stored; the extractor keeps counting
// past the limit so the caller can report how much was dropped.

use crate::core_modules::cluster::BoundingBox;
use crate::core_modules::frame::{Frame, GRAY_CHANNELS};
use crate::core_modules::preprocessor::MASK_FOREGROUND;
use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MAX_LOCATIONS: usize = 2000;
pub const DEFAULT_WINDOW: u32 = 10;
pub const DEFAULT_MIN_COUNT: u32 = 6;

/// A candidate foreground coordinate in mask space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub row: u16,
    pub col: u16,
}

impl Location {
    pub fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// Tunables for the density filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionParams {
    /// Number of pixels summed to the right and below each candidate.
    pub window: u32,
    /// The summed count must be strictly greater than this.
    pub min_count: u32,
    /// Storage capacity of the returned location list.
    pub max_locations: usize,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            min_count: DEFAULT_MIN_COUNT,
            max_locations: MAX_LOCATIONS,
        }
    }
}

/// The bounded result of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationSet {
    /// Stored locations in scan order (row-major), at most `capacity` of them.
    pub locations: Vec<Location>,
    /// How many pixels passed the density test, stored or not.
    pub raw_count: usize,
    pub capacity: usize,
}

impl LocationSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            locations: Vec::with_capacity(capacity),
            raw_count: 0,
            capacity,
        }
    }

    /// Records a hit, storing it only while capacity remains.
    fn push(&mut self, location: Location) {
        self.raw_count += 1;
        if self.locations.len() < self.capacity {
            self.locations.push(location);
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.raw_count > self.locations.len()
    }

    pub fn as_slice(&self) -> &[Location] {
        &self.locations
    }
}

/// Mass center and extent of a whole location list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationSummary {
    pub mass_center: Location,
    pub bounding_box: BoundingBox,
    pub count: usize,
}

/// Runs the directional density filter over a 0/1 mask.
pub fn extract_locations(mask: &Frame, params: &ExtractionParams) -> DetectionResult<LocationSet> {
    mask.require_channels(GRAY_CHANNELS)?;
    if params.window == 0 {
        return Err(DetectionError::InvalidConfig(
            "location window must be at least one pixel".to_string(),
        ));
    }
    if mask.width > u16::MAX as u32 + 1 || mask.height > u16::MAX as u32 + 1 {
        return Err(DetectionError::InvalidGeometry {
            operation: "extract_locations",
            requested_width: mask.width,
            requested_height: mask.height,
            source_width: u16::MAX as u32 + 1,
            source_height: u16::MAX as u32 + 1,
        });
    }

    let (width, height) = (mask.width as usize, mask.height as usize);
    let window = params.window as usize;
    let at = |row: usize, col: usize| -> u32 {
        if row < height && col < width {
            mask.data[row * width + col] as u32
        } else {
            0
        }
    };

    let mut found = LocationSet::with_capacity(params.max_locations);
    if window > width || window > height {
        return Ok(found);
    }

    for row in 0..=(height - window) {
        for col in 0..=(width - window) {
            if mask.data[row * width + col] != MASK_FOREGROUND {
                continue;
            }
            let count_right: u32 = (1..=window).map(|k| at(row, col + k)).sum();
            let count_below: u32 = (1..=window).map(|k| at(row + k, col)).sum();
            if count_right + count_below > params.min_count {
                found.push(Location::new(row as u16, col as u16));
            }
        }
    }

    if found.is_truncated() {
        warn!(
            raw = found.raw_count,
            kept = found.len(),
            "too many locations detected, list truncated"
        );
    } else {
        debug!(count = found.len(), "locations extracted");
    }
    Ok(found)
}

/// Integer mass center and bounding box of `locations`; `None` when empty.
pub fn summarize_locations(locations: &[Location]) -> Option<LocationSummary> {
    let (first, rest) = locations.split_first()?;
    let mut bounding_box = BoundingBox::from_point(*first);
    let mut sum_row = first.row as u64;
    let mut sum_col = first.col as u64;
    for location in rest {
        bounding_box = bounding_box.include(*location);
        sum_row += location.row as u64;
        sum_col += location.col as u64;
    }
    let count = locations.len();
    Some(LocationSummary {
        mass_center: Location::new(
            (sum_row / count as u64) as u16,
            (sum_col / count as u64) as u16,
        ),
        bounding_box,
        count,
    })
}
