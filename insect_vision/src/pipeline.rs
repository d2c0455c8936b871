// THEORY:
// The `pipeline` module is the top-level API of the detection engine. It strings the
// core modules together into one detection cycle and hands back a single report:
//
//   gray frame + background
//     -> background subtraction + binarization (full resolution)
//     -> mask downsampled by the sizing factor
//     -> density-filtered locations
//     -> three-phase clustering
//     -> crop windows in full-frame coordinates
//
// A cycle is synchronous and runs to completion. Nothing survives from one cycle to
// the next; the `Detector` only holds its validated configuration, so the same frames
// always produce the same report. Cutting the crop windows out of the RGB capture is a
// separate step (`extract_crops`) because it is the only part that touches the color
// frame, and a failure there only ever costs the one crop that failed.

use crate::core_modules::cluster::ClusterSet;
use crate::core_modules::cluster_engine::{self, ClusterParams};
use crate::core_modules::crop_selector::{self, CropParams};
use crate::core_modules::frame::{Frame, GRAY_CHANNELS, RGB_CHANNELS};
use crate::core_modules::geometry;
use crate::core_modules::location_extractor::{
    self, DEFAULT_WINDOW, ExtractionParams, LocationSet, MAX_LOCATIONS,
};
use crate::core_modules::preprocessor::{self, Polarity, SubtractionMode};
use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Re-export the data structures a caller needs to read a report.
pub use crate::core_modules::cluster::{BoundingBox, Cluster, MAX_CLUSTERS};
pub use crate::core_modules::crop_selector::{CropRegion, CropSource, CropStrategy};
pub use crate::core_modules::location_extractor::Location;

pub const DEFAULT_FRAME_WIDTH: u32 = 1920;
pub const DEFAULT_FRAME_HEIGHT: u32 = 1080;
pub const DEFAULT_SIZING_FACTOR: u32 = 4;
pub const DEFAULT_THRESHOLD: u8 = 50;
/// Density threshold used by the detection cycle; one lower than the extractor's own default.
pub const DEFAULT_CYCLE_MIN_COUNT: u32 = 5;

/// Target size for extracted crops, typically a classifier's input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Configuration for the `Detector`. Every field has a default, so a partial JSON
/// document only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image_width: u32,
    pub image_height: u32,
    /// Integer divisor between the full frame and the detection mask.
    pub sizing_factor: u32,
    pub threshold_value: u8,
    pub polarity: Polarity,
    pub subtraction: SubtractionMode,
    /// Density window of the location extractor, in mask pixels.
    pub window: u32,
    pub min_count: u32,
    pub max_locations: usize,
    pub cluster: ClusterParams,
    pub crop: CropParams,
    /// When set, every extracted crop is downsampled to this size.
    pub crop_output_size: Option<OutputSize>,
    pub color_correct_crops: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_FRAME_WIDTH,
            image_height: DEFAULT_FRAME_HEIGHT,
            sizing_factor: DEFAULT_SIZING_FACTOR,
            threshold_value: DEFAULT_THRESHOLD,
            polarity: Polarity::Darker,
            subtraction: SubtractionMode::Saturating,
            window: DEFAULT_WINDOW,
            min_count: DEFAULT_CYCLE_MIN_COUNT,
            max_locations: MAX_LOCATIONS,
            cluster: ClusterParams::default(),
            crop: CropParams::default(),
            crop_output_size: None,
            color_correct_crops: false,
        }
    }
}

impl PipelineConfig {
    /// Default geometry for a frame of the given size.
    pub fn for_frame(image_width: u32, image_height: u32) -> Self {
        Self {
            image_width,
            image_height,
            ..Self::default()
        }
    }

    /// The bench-debugging parameter set: a stricter density test and a wider
    /// labeling distance. Foreground is still darker than the background.
    pub fn debug_preset(image_width: u32, image_height: u32) -> Self {
        Self {
            min_count: location_extractor::DEFAULT_MIN_COUNT,
            cluster: ClusterParams {
                dist: 10,
                ..ClusterParams::default()
            },
            ..Self::for_frame(image_width, image_height)
        }
    }

    /// Dimensions of the detection mask.
    pub fn mask_dimensions(&self) -> (u32, u32) {
        (
            self.image_width / self.sizing_factor.max(1),
            self.image_height / self.sizing_factor.max(1),
        )
    }

    pub fn extraction_params(&self) -> ExtractionParams {
        ExtractionParams {
            window: self.window,
            min_count: self.min_count,
            max_locations: self.max_locations,
        }
    }

    pub fn validate(&self) -> DetectionResult<()> {
        let invalid = |message: &str| -> DetectionResult<()> {
            Err(DetectionError::InvalidConfig(message.to_string()))
        };
        if self.image_width == 0 || self.image_height == 0 {
            return invalid("frame width and height must be non-zero");
        }
        if self.sizing_factor == 0 {
            return invalid("sizing factor must be at least 1");
        }
        if self.sizing_factor > self.image_width || self.sizing_factor > self.image_height {
            return invalid("sizing factor is larger than the frame");
        }
        if self.window == 0 {
            return invalid("location window must be at least one pixel");
        }
        if self.crop.window_size == 0 {
            return invalid("crop window must be non-zero");
        }
        if let Some(size) = self.crop_output_size {
            if size.width == 0 || size.height == 0 {
                return invalid("crop output size must be non-zero");
            }
        }
        Ok(())
    }
}

/// The outcome of one detection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionReport {
    pub locations: LocationSet,
    /// Number of distinct labels after proximity labeling.
    pub initial_cluster_count: usize,
    /// First-merge groups, kept for diagnostic display.
    pub grouped_clusters: ClusterSet,
    pub dropped_groups: usize,
    pub clusters: ClusterSet,
    pub crops: Vec<CropRegion>,
    pub elapsed: Duration,
}

impl DetectionReport {
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// One crop cut out of the RGB frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCrop {
    pub region: CropRegion,
    pub image: Frame,
}

/// A crop that could not be produced. The rest of the batch is unaffected.
#[derive(Debug)]
pub struct SkippedCrop {
    pub region: CropRegion,
    pub error: DetectionError,
}

#[derive(Debug, Default)]
pub struct CropBatch {
    pub crops: Vec<ExtractedCrop>,
    pub skipped: Vec<SkippedCrop>,
}

/// The detection engine's entry point.
#[derive(Debug, Clone)]
pub struct Detector {
    config: PipelineConfig,
}

impl Detector {
    pub fn new(config: PipelineConfig) -> DetectionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one full detection cycle on a grayscale frame and its background.
    pub fn run_cycle(&self, gray: &Frame, background: &Frame) -> DetectionResult<DetectionReport> {
        let started = Instant::now();
        self.require_frame_shape(gray, GRAY_CHANNELS)?;
        self.require_frame_shape(background, GRAY_CHANNELS)?;
        let config = &self.config;

        // Stage 1: Foreground mask at full resolution
        let diff = preprocessor::background_subtract(gray, background, config.subtraction)?;
        let mask = preprocessor::binarize(&diff, config.threshold_value, config.polarity)?;

        // Stage 2: Downsample to detection resolution
        let (mask_width, mask_height) = config.mask_dimensions();
        let mask = geometry::resize(&mask, mask_width, mask_height)?;

        // Stage 3: Density-filtered locations
        let locations = location_extractor::extract_locations(&mask, &config.extraction_params())?;

        // Stage 4: Clustering
        let outcome = cluster_engine::detect_clusters(locations.as_slice(), &config.cluster);

        // Stage 5: Crop windows in full-frame space
        let crops = crop_selector::select_crops(
            &outcome.clusters,
            config.sizing_factor,
            config.image_width,
            config.image_height,
            &config.crop,
        )?;

        let elapsed = started.elapsed();
        info!(
            locations = locations.len(),
            raw_locations = locations.raw_count,
            clusters = outcome.clusters.len(),
            crops = crops.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "detection cycle complete"
        );

        Ok(DetectionReport {
            locations,
            initial_cluster_count: outcome.initial_count,
            grouped_clusters: outcome.grouped,
            dropped_groups: outcome.dropped_groups,
            clusters: outcome.clusters,
            crops,
            elapsed,
        })
    }

    /// Cuts every region out of `rgb`, then applies the configured color correction and
    /// output resize. A region that fails at any step is reported in `skipped`.
    pub fn extract_crops(&self, rgb: &Frame, regions: &[CropRegion]) -> DetectionResult<CropBatch> {
        self.require_frame_shape(rgb, RGB_CHANNELS)?;

        let mut batch = CropBatch::default();
        for region in regions {
            match self.extract_one(rgb, region) {
                Ok(image) => batch.crops.push(ExtractedCrop {
                    region: *region,
                    image,
                }),
                Err(error) => {
                    warn!(cluster = region.cluster_index, %error, "crop skipped");
                    batch.skipped.push(SkippedCrop {
                        region: *region,
                        error,
                    });
                }
            }
        }
        debug!(
            extracted = batch.crops.len(),
            skipped = batch.skipped.len(),
            "crops extracted"
        );
        Ok(batch)
    }

    /// `run_cycle` followed by `extract_crops` on the same cycle's RGB frame.
    pub fn detect_and_crop(
        &self,
        gray: &Frame,
        background: &Frame,
        rgb: &Frame,
    ) -> DetectionResult<(DetectionReport, CropBatch)> {
        let report = self.run_cycle(gray, background)?;
        let batch = self.extract_crops(rgb, &report.crops)?;
        Ok((report, batch))
    }

    fn extract_one(&self, rgb: &Frame, region: &CropRegion) -> DetectionResult<Frame> {
        let mut image = geometry::crop(rgb, region.x0, region.y0, region.x1, region.y1)?;
        if self.config.color_correct_crops {
            geometry::color_correction(&mut image)?;
        }
        match self.config.crop_output_size {
            Some(size) => geometry::resize(&image, size.width, size.height),
            None => Ok(image),
        }
    }

    fn require_frame_shape(&self, frame: &Frame, channels: u8) -> DetectionResult<()> {
        if frame.width != self.config.image_width || frame.height != self.config.image_height {
            return Err(DetectionError::DimensionMismatch {
                left_width: frame.width,
                left_height: frame.height,
                right_width: self.config.image_width,
                right_height: self.config.image_height,
            });
        }
        frame.require_channels(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::cluster_engine::LabelingMode;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mask_dimensions(), (480, 270));
        assert_eq!(config.min_count, 5);
        assert_eq!(config.cluster.labeling, LabelingMode::SinglePass);
    }

    #[test]
    fn validation_rejects_bad_geometry() {
        let cases = [
            PipelineConfig { image_width: 0, ..PipelineConfig::default() },
            PipelineConfig { sizing_factor: 0, ..PipelineConfig::default() },
            PipelineConfig { sizing_factor: 2000, ..PipelineConfig::default() },
            PipelineConfig { window: 0, ..PipelineConfig::default() },
            PipelineConfig {
                crop_output_size: Some(OutputSize { width: 0, height: 224 }),
                ..PipelineConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(
                Detector::new(config),
                Err(DetectionError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "image_width": 640, "image_height": 480, "polarity": "brighter",
                 "cluster": { "dist": 10, "clus_var": 50, "clus_var2": 75 } }"#,
        )
        .unwrap();
        assert_eq!((config.image_width, config.image_height), (640, 480));
        assert_eq!(config.polarity, Polarity::Brighter);
        assert_eq!(config.cluster.dist, 10);
        assert_eq!(config.cluster.labeling, LabelingMode::SinglePass);
        assert_eq!(config.sizing_factor, DEFAULT_SIZING_FACTOR);
    }

    #[test]
    fn debug_preset_finds_only_the_insect() {
        let config = PipelineConfig::debug_preset(640, 480);
        assert_eq!(config.polarity, Polarity::Darker);
        assert_eq!((config.min_count, config.cluster.dist), (6, 10));
        let detector = Detector::new(config).unwrap();

        let background = Frame::filled(640, 480, GRAY_CHANNELS, 200);
        let empty = detector.run_cycle(&background, &background).unwrap();
        assert!(empty.locations.is_empty());
        assert!(empty.is_empty());

        let mut gray = background.clone();
        for y in 200..240 {
            for x in 300..340 {
                gray.data[(y * 640 + x) as usize] = 40;
            }
        }
        let report = detector.run_cycle(&gray, &background).unwrap();
        assert_eq!(report.clusters.len(), 1);
        // The insect covers mask rows 50..60 and columns 75..85.
        let b = report.clusters.get(0).unwrap().bounding_box;
        assert!(b.min_row >= 50 && b.max_row < 60);
        assert!(b.min_col >= 75 && b.max_col < 85);
        let region = report.crops[0];
        assert!(region.x0 <= 300 && region.x1 >= 340);
        assert!(region.y0 <= 200 && region.y1 >= 240);
    }

    #[test]
    fn frames_must_match_configured_size() {
        let detector = Detector::new(PipelineConfig::for_frame(64, 64)).unwrap();
        let gray = Frame::filled(32, 32, GRAY_CHANNELS, 0);
        assert!(matches!(
            detector.run_cycle(&gray, &gray),
            Err(DetectionError::DimensionMismatch { .. })
        ));
        let rgb_as_gray = Frame::filled(64, 64, RGB_CHANNELS, 0);
        assert!(matches!(
            detector.run_cycle(&rgb_as_gray, &rgb_as_gray),
            Err(DetectionError::ChannelMismatch { .. })
        ));
    }
}
