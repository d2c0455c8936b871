// THEORY:
// This file is the main entry point for the `insect_vision` library crate.
// It exposes the `Detector` and its associated data structures (`PipelineConfig`,
// `DetectionReport`, `CropBatch`) as the high-level interface for the detection
// engine, used by the `frame_tester` harness and any capture loop built on top.
//
// The stage modules under `core_modules` stay public so callers (and the tests) can
// run a single stage on its own, but a normal caller only needs the pipeline.

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use error::{DetectionError, DetectionResult};
pub use pipeline::{CropBatch, DetectionReport, Detector, PipelineConfig};
