// THEORY:
// The `Frame` module is the data container every stage of the detector reads from or
// writes into. A frame is a rectangular block of 8-bit samples, either three
// interleaved channels (RGB) or a single channel (a grayscale capture or a mask).
//
// Key architectural principles:
// 1.  **Dumb Container**: Like the pixel-level containers before it, a `Frame` only
//     knows its own shape and how to index itself. All image arithmetic lives in the
//     `geometry` and `preprocessor` modules.
// 2.  **Checked Construction**: The only way to build a frame from raw bytes is through
//     a constructor that verifies `data.len() == width * height * channels`. Every
//     later stage can then index without re-checking the buffer length.
// 3.  **Caller Ownership**: The detection engine borrows frames for one cycle and never
//     keeps a reference past the call that received it.

use crate::error::{DetectionError, DetectionResult};
use image::{GrayImage, RgbImage};

pub const GRAY_CHANNELS: u8 = 1;
pub const RGB_CHANNELS: u8 = 3;

/// A rectangular buffer of 8-bit samples with explicit dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The width of the frame in pixels.
    pub width: u32,
    /// The height of the frame in pixels.
    pub height: u32,
    /// Samples per pixel: 1 for grayscale/mask frames, 3 for RGB.
    pub channels: u8,
    /// Row-major, channel-interleaved sample data.
    pub data: Vec<u8>,
}

impl Frame {
    /// Wraps raw bytes, validating the length against the declared shape.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> DetectionResult<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(DetectionError::BufferSizeMismatch {
                width,
                height,
                channels,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> DetectionResult<Self> {
        Self::new(width, height, GRAY_CHANNELS, data)
    }

    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> DetectionResult<Self> {
        Self::new(width, height, RGB_CHANNELS, data)
    }

    /// A frame where every sample holds `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: vec![value; len],
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte offset of the first sample of pixel `(x, y)`.
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// The samples of pixel `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.channels as usize]
    }

    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    pub(crate) fn require_channels(&self, expected: u8) -> DetectionResult<()> {
        if self.channels != expected {
            return Err(DetectionError::ChannelMismatch {
                expected,
                actual: self.channels,
            });
        }
        Ok(())
    }

    pub fn into_gray_image(self) -> DetectionResult<GrayImage> {
        self.require_channels(GRAY_CHANNELS)?;
        let (width, height) = (self.width, self.height);
        GrayImage::from_raw(width, height, self.data).ok_or(DetectionError::BufferSizeMismatch {
            width,
            height,
            channels: GRAY_CHANNELS,
            actual: 0,
        })
    }

    pub fn into_rgb_image(self) -> DetectionResult<RgbImage> {
        self.require_channels(RGB_CHANNELS)?;
        let (width, height) = (self.width, self.height);
        RgbImage::from_raw(width, height, self.data).ok_or(DetectionError::BufferSizeMismatch {
            width,
            height,
            channels: RGB_CHANNELS,
            actual: 0,
        })
    }
}

impl From<GrayImage> for Frame {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: GRAY_CHANNELS,
            data: image.into_raw(),
        }
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: RGB_CHANNELS,
            data: image.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let err = Frame::rgb(4, 4, vec![0u8; 47]).unwrap_err();
        assert!(matches!(
            err,
            DetectionError::BufferSizeMismatch { actual: 47, channels: 3, .. }
        ));
    }

    #[test]
    fn indexes_interleaved_pixels() {
        let mut data = vec![0u8; 2 * 2 * 3];
        data[9..12].copy_from_slice(&[7, 8, 9]);
        let frame = Frame::rgb(2, 2, data).expect("valid frame");
        assert_eq!(frame.pixel(1, 1), &[7, 8, 9]);
        assert_eq!(frame.offset(1, 1), 9);
    }

    #[test]
    fn converts_through_image_types() {
        let frame = Frame::filled(3, 2, GRAY_CHANNELS, 42);
        let image = frame.clone().into_gray_image().expect("gray conversion");
        assert_eq!(image.get_pixel(2, 1).0, [42]);
        assert_eq!(Frame::from(image), frame);
    }

    #[test]
    fn refuses_wrong_channel_conversion() {
        let frame = Frame::filled(3, 2, GRAY_CHANNELS, 0);
        assert!(matches!(
            frame.into_rgb_image(),
            Err(DetectionError::ChannelMismatch { expected: 3, actual: 1 })
        ));
    }
}
