// THEORY:
// The `error` module defines the single error type shared by every stage of the
// detection engine. Failures inside a detection cycle are always local: a bad crop
// request rejects that one crop, a bad resize rejects that one resize. Nothing here
// is fatal to the cycle, so the variants describe *what* was rejected and leave the
// decision to skip-and-continue to the caller.
//
// Capacity overflow (too many locations, too many clusters) has no variant. Those
// cases truncate and report through the returned counts instead of failing.

use thiserror::Error;

/// Errors produced by the detection engine and its geometry helpers.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// A crop or resize whose requested geometry does not fit the source buffer.
    #[error("invalid geometry for {operation}: requested {requested_width}x{requested_height} from {source_width}x{source_height}")]
    InvalidGeometry {
        operation: &'static str,
        requested_width: u32,
        requested_height: u32,
        source_width: u32,
        source_height: u32,
    },

    /// A raw buffer whose length disagrees with its declared dimensions.
    #[error("buffer of {actual} bytes does not match {width}x{height}x{channels}")]
    BufferSizeMismatch {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },

    /// Two frames that must share dimensions (frame and background) do not.
    #[error("frame dimensions differ: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    /// A frame with the wrong channel count for the requested operation.
    #[error("expected a {expected}-channel frame, got {actual} channels")]
    ChannelMismatch { expected: u8, actual: u8 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type DetectionResult<T> = Result<T, DetectionError>;
