// THEORY:
// The `preprocessor` turns a grayscale capture into a binary foreground mask in two
// steps: subtract the background reference, then threshold the difference.
//
// The difference is biased by `DIFFERENCE_OFFSET` so an unchanged pixel lands at 100
// rather than 0. Objects darker than the background pull the difference toward 0,
// brighter ones push it toward 255. `Polarity` chooses which side counts as
// foreground: `Darker` (insects against a bright trap) or `Brighter`.
//
// The mask comes in two encodings. The canonical 0/1 mask feeds the location
// extractor, whose density test sums mask values directly. The 0/255 mask exists only
// for display.

use crate::core_modules::frame::{Frame, GRAY_CHANNELS};
use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};

/// Bias added to `frame - background` so an unchanged pixel maps to mid-range.
pub const DIFFERENCE_OFFSET: i16 = 100;

pub const MASK_FOREGROUND: u8 = 1;
pub const DISPLAY_FOREGROUND: u8 = 255;

/// How the biased difference is squeezed back into a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtractionMode {
    /// Signed arithmetic clamped to `[0, 255]`.
    #[default]
    Saturating,
    /// Byte arithmetic that wraps modulo 256, as the camera firmware computes it.
    Wrapping,
}

/// Which side of the threshold is foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Foreground where `diff > threshold`.
    Brighter,
    /// Foreground where `diff <= threshold`.
    #[default]
    Darker,
}

/// Per-pixel `frame - background + 100`, reduced to a byte according to `mode`.
pub fn background_subtract(
    frame: &Frame,
    background: &Frame,
    mode: SubtractionMode,
) -> DetectionResult<Frame> {
    frame.require_channels(GRAY_CHANNELS)?;
    if !frame.same_shape(background) {
        return Err(DetectionError::DimensionMismatch {
            left_width: frame.width,
            left_height: frame.height,
            right_width: background.width,
            right_height: background.height,
        });
    }

    let data = frame
        .data
        .iter()
        .zip(&background.data)
        .map(|(&sample, &reference)| match mode {
            SubtractionMode::Saturating => {
                (sample as i16 - reference as i16 + DIFFERENCE_OFFSET).clamp(0, 255) as u8
            }
            SubtractionMode::Wrapping => sample
                .wrapping_sub(reference)
                .wrapping_add(DIFFERENCE_OFFSET as u8),
        })
        .collect();

    Ok(Frame {
        width: frame.width,
        height: frame.height,
        channels: GRAY_CHANNELS,
        data,
    })
}

/// Canonical 0/1 mask: 1 where `diff > threshold_value`.
pub fn threshold(diff: &Frame, threshold_value: u8) -> DetectionResult<Frame> {
    map_mask(diff, |sample| {
        if sample > threshold_value { MASK_FOREGROUND } else { 0 }
    })
}

/// Display-oriented 0/255 mask: 255 where `diff > threshold_value`.
pub fn threshold_display(diff: &Frame, threshold_value: u8) -> DetectionResult<Frame> {
    map_mask(diff, |sample| {
        if sample > threshold_value { DISPLAY_FOREGROUND } else { 0 }
    })
}

/// Inverted 0/1 mask: 1 where `diff <= threshold_value`.
pub fn threshold_inverted(diff: &Frame, threshold_value: u8) -> DetectionResult<Frame> {
    map_mask(diff, |sample| {
        if sample > threshold_value { 0 } else { MASK_FOREGROUND }
    })
}

/// 0/1 mask with foreground chosen by `polarity`.
pub fn binarize(diff: &Frame, threshold_value: u8, polarity: Polarity) -> DetectionResult<Frame> {
    match polarity {
        Polarity::Brighter => threshold(diff, threshold_value),
        Polarity::Darker => threshold_inverted(diff, threshold_value),
    }
}

/// Rescales a 0/1 mask to 0/255 for display.
pub fn mask_to_display(mask: &Frame) -> DetectionResult<Frame> {
    map_mask(mask, |sample| if sample == 0 { 0 } else { DISPLAY_FOREGROUND })
}

fn map_mask(source: &Frame, f: impl Fn(u8) -> u8) -> DetectionResult<Frame> {
    source.require_channels(GRAY_CHANNELS)?;
    Ok(Frame {
        width: source.width,
        height: source.height,
        channels: GRAY_CHANNELS,
        data: source.data.iter().map(|&sample| f(sample)).collect(),
    })
}
