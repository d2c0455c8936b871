// THEORY:
// The `geometry` module holds the pure buffer transforms shared by every stage that
// needs to move pixels around: rectangular cropping, nearest-neighbor downsampling
// and a fixed color correction for RGB captures.
//
// Key architectural principles:
// 1.  **Reject, Don't Guess**: A crop or resize whose target does not fit the source is
//     rejected with `DetectionError::InvalidGeometry`. The caller skips that one unit
//     of work and the detection cycle continues.
// 2.  **Downsample Only**: `resize` is a nearest-neighbor decimator. Upscaling is not
//     supported and is reported as invalid geometry.
// 3.  **Demosaic Border Correction**: The camera's demosaic stage leaves a one-pixel
//     garbage border along the top row and left column. Every destination pixel in
//     row 0 or column 0 is therefore sampled one source row lower and
//     `DEMOSAIC_BORDER_SKIP_BYTES` further along that row. The offset is in bytes, so
//     it moves one pixel on RGB frames and three pixels on single-channel masks. This
//     must be reproduced exactly; downstream thresholds were tuned against it.

use crate::core_modules::frame::{Frame, RGB_CHANNELS};
use crate::error::{DetectionError, DetectionResult};

/// Byte skip applied along the row when sampling the corrected border.
pub const DEMOSAIC_BORDER_SKIP_BYTES: usize = 3;

pub const COLOR_CORRECTION_BRIGHTNESS: i32 = -35;
pub const COLOR_CORRECTION_CONTRAST: f64 = 1.25;

/// Copies the sub-rectangle `[x0, x1) x [y0, y1)` out of `image`, row by row.
pub fn crop(image: &Frame, x0: u32, y0: u32, x1: u32, y1: u32) -> DetectionResult<Frame> {
    let new_width = x1.saturating_sub(x0);
    let new_height = y1.saturating_sub(y0);
    if new_width == 0
        || new_height == 0
        || new_width > image.width
        || new_height > image.height
        || x1 > image.width
        || y1 > image.height
    {
        return Err(DetectionError::InvalidGeometry {
            operation: "crop",
            requested_width: new_width,
            requested_height: new_height,
            source_width: image.width,
            source_height: image.height,
        });
    }

    let channels = image.channels as usize;
    let row_bytes = new_width as usize * channels;
    let mut data = Vec::with_capacity(row_bytes * new_height as usize);
    for y in y0..y1 {
        let start = image.offset(x0, y);
        data.extend_from_slice(&image.data[start..start + row_bytes]);
    }

    Ok(Frame {
        width: new_width,
        height: new_height,
        channels: image.channels,
        data,
    })
}

/// Nearest-neighbor downsample of `image` to `new_width x new_height`.
///
/// Destination pixel `(x, y)` samples source pixel
/// `(x * width / new_width, y * height / new_height)`, except on the corrected border
/// (row 0 or column 0) where the sample is taken one row lower and
/// [`DEMOSAIC_BORDER_SKIP_BYTES`] further along. Border samples that would fall off
/// the source are clamped to its last row/column.
pub fn resize(image: &Frame, new_width: u32, new_height: u32) -> DetectionResult<Frame> {
    if new_width == 0 || new_height == 0 || new_width > image.width || new_height > image.height {
        return Err(DetectionError::InvalidGeometry {
            operation: "resize",
            requested_width: new_width,
            requested_height: new_height,
            source_width: image.width,
            source_height: image.height,
        });
    }

    let channels = image.channels as usize;
    let border_col_skip = (DEMOSAIC_BORDER_SKIP_BYTES / channels).max(1) as u32;
    let (width, height) = (image.width as u64, image.height as u64);
    let mut data = Vec::with_capacity(new_width as usize * new_height as usize * channels);

    for y in 0..new_height {
        let src_y = (y as u64 * height / new_height as u64) as u32;
        for x in 0..new_width {
            let src_x = (x as u64 * width / new_width as u64) as u32;
            let (sample_x, sample_y) = if x == 0 || y == 0 {
                (
                    (src_x + border_col_skip).min(image.width - 1),
                    (src_y + 1).min(image.height - 1),
                )
            } else {
                (src_x, src_y)
            };
            data.extend_from_slice(image.pixel(sample_x, sample_y));
        }
    }

    Ok(Frame {
        width: new_width,
        height: new_height,
        channels: image.channels,
        data,
    })
}

/// Gray-world white balance followed by the fixed brightness/contrast adjustment.
pub fn color_correction(image: &mut Frame) -> DetectionResult<()> {
    image.require_channels(RGB_CHANNELS)?;
    apply_gray_world_balance(image);
    apply_brightness_contrast(image, COLOR_CORRECTION_BRIGHTNESS, COLOR_CORRECTION_CONTRAST);
    Ok(())
}

/// Scales each channel so its mean equals the mean of the three channel means.
fn apply_gray_world_balance(image: &mut Frame) {
    let pixel_count = image.pixel_count();
    if pixel_count == 0 {
        return;
    }

    let mut sums = [0f64; 3];
    for pixel in image.data.chunks_exact(3) {
        for (sum, &sample) in sums.iter_mut().zip(pixel) {
            *sum += sample as f64;
        }
    }
    let means = sums.map(|sum| sum / pixel_count as f64);
    let gray = means.iter().sum::<f64>() / 3.0;
    // A channel with zero mean stays untouched instead of dividing by zero.
    let scales = means.map(|mean| if mean > 0.0 { gray / mean } else { 1.0 });

    for pixel in image.data.chunks_exact_mut(3) {
        for (sample, scale) in pixel.iter_mut().zip(scales) {
            *sample = (*sample as f64 * scale).min(255.0) as u8;
        }
    }
}

fn apply_brightness_contrast(image: &mut Frame, brightness: i32, contrast: f64) {
    for sample in image.data.iter_mut() {
        let value = (*sample as f64 * contrast + brightness as f64) as i32;
        *sample = value.clamp(0, 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::GRAY_CHANNELS;

    fn gradient_rgb(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, (x + y) as u8]);
            }
        }
        Frame::rgb(width, height, data).expect("valid gradient")
    }

    #[test]
    fn crop_copies_sub_rectangle() {
        let image = gradient_rgb(10, 8);
        let cropped = crop(&image, 2, 3, 6, 5).expect("crop fits");
        assert_eq!((cropped.width, cropped.height), (4, 2));
        assert_eq!(cropped.pixel(0, 0), &[2, 3, 5]);
        assert_eq!(cropped.pixel(3, 1), &[5, 4, 9]);
    }

    #[test]
    fn crop_larger_than_source_is_rejected() {
        let image = gradient_rgb(10, 8);
        assert!(matches!(
            crop(&image, 0, 0, 11, 4),
            Err(DetectionError::InvalidGeometry { operation: "crop", .. })
        ));
        assert!(crop(&image, 4, 4, 4, 6).is_err());
        assert!(crop(&image, 5, 0, 12, 4).is_err());
    }

    #[test]
    fn resize_samples_nearest_neighbor_with_border_correction() {
        let image = gradient_rgb(8, 8);
        let small = resize(&image, 4, 4).expect("downsample");
        // Interior pixel (1,1) samples source (2,2).
        assert_eq!(small.pixel(1, 1), &[2, 2, 4]);
        // Interior pixel (3,2) samples source (6,4).
        assert_eq!(small.pixel(3, 2), &[6, 4, 10]);
        // Border pixel (0,0) samples source (0+1, 0+1).
        assert_eq!(small.pixel(0, 0), &[1, 1, 2]);
        // Border pixel (2,0) samples source (4+1, 0+1).
        assert_eq!(small.pixel(2, 0), &[5, 1, 6]);
        // Border pixel (0,3) samples source (0+1, 6+1).
        assert_eq!(small.pixel(0, 3), &[1, 7, 8]);
    }

    #[test]
    fn mask_border_skips_three_columns() {
        let data: Vec<u8> = (0..64).map(|i| (i % 8) as u8).collect();
        let mask = Frame::new(8, 8, GRAY_CHANNELS, data).expect("valid mask");
        let small = resize(&mask, 4, 4).expect("downsample");
        assert_eq!(small.pixel(0, 0), &[3]);
        assert_eq!(small.pixel(1, 0), &[5]);
        // Column 6 + 3 clamps to the last column.
        assert_eq!(small.pixel(3, 0), &[7]);
        assert_eq!(small.pixel(1, 1), &[2]);
    }

    #[test]
    fn resize_rejects_upscale() {
        let image = gradient_rgb(4, 4);
        assert!(matches!(
            resize(&image, 5, 4),
            Err(DetectionError::InvalidGeometry { operation: "resize", .. })
        ));
        assert!(resize(&image, 0, 4).is_err());
    }

    #[test]
    fn color_correction_balances_and_adjusts() {
        // Channel means 100, 200, 0 average to 100; the empty channel keeps scale 1.
        let mut image = Frame::rgb(2, 1, vec![100, 200, 0, 100, 200, 0]).expect("valid");
        color_correction(&mut image).expect("rgb frame");
        // Balanced to 100, then 100 * 1.25 - 35 = 90; 0 * 1.25 - 35 clamps to 0.
        assert_eq!(image.data, vec![90, 90, 0, 90, 90, 0]);
    }

    #[test]
    fn color_correction_clamps_to_byte_range() {
        let mut image = Frame::rgb(1, 2, vec![255, 255, 255, 10, 10, 10]).expect("valid");
        color_correction(&mut image).expect("rgb frame");
        assert_eq!(image.pixel(0, 0), &[255, 255, 255]);
        assert_eq!(image.pixel(0, 1), &[0, 0, 0]);
    }

    #[test]
    fn color_correction_requires_rgb() {
        let mut mask = Frame::filled(2, 2, GRAY_CHANNELS, 1);
        assert!(color_correction(&mut mask).is_err());
    }
}
