//! Terminal preview: frames drawn as ANSI true-color blocks.

use insect_vision::core_modules::frame::{Frame, GRAY_CHANNELS};
use insect_vision::core_modules::geometry;
use insect_vision::DetectionResult;
use std::fmt::Write;

/// Largest preview edge, in terminal cells.
pub const CONSOLE_MAX: u32 = 32;

const RESET: &str = "\x1b[0m";

/// Downsizes `frame` to fit a `CONSOLE_MAX` square and renders one two-space cell per pixel.
pub fn render(frame: &Frame) -> DetectionResult<String> {
    let (width, height) = preview_size(frame.width, frame.height);
    let small = if (width, height) == (frame.width, frame.height) {
        frame.clone()
    } else {
        geometry::resize(frame, width, height)?
    };

    let mut out = String::with_capacity((width as usize * 20 + 8) * height as usize);
    for y in 0..small.height {
        for x in 0..small.width {
            let (r, g, b) = match small.pixel(x, y) {
                [v] => (*v, *v, *v),
                [r, g, b, ..] => (*r, *g, *b),
                _ => (0, 0, 0),
            };
            // Writing into a String cannot fail.
            let _ = write!(out, "\x1b[48;2;{r};{g};{b}m  ");
        }
        out.push_str(RESET);
        out.push('\n');
    }
    Ok(out)
}

/// Renders a 0/1 detection mask as black and white.
pub fn render_mask(mask: &Frame) -> DetectionResult<String> {
    debug_assert_eq!(mask.channels, GRAY_CHANNELS);
    render(&insect_vision::core_modules::preprocessor::mask_to_display(mask)?)
}

fn preview_size(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= CONSOLE_MAX {
        return (width, height);
    }
    let scale = |side: u32| ((side as u64 * CONSOLE_MAX as u64) / longest as u64).max(1) as u32;
    (scale(width), scale(height))
}
