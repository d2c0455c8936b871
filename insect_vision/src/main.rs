// This file is an example of how to use the `insect_vision` library.
// The main library entry point is `src/lib.rs`; the full harness lives in `frame_tester`.

use insect_vision::core_modules::frame::{Frame, GRAY_CHANNELS, RGB_CHANNELS};
use insect_vision::{Detector, PipelineConfig};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn main() -> Result<(), insect_vision::DetectionError> {
    println!("Insect Vision - Example Runner");

    // A bright empty trap with one dark 40x40 insect on it.
    let background = Frame::filled(WIDTH, HEIGHT, GRAY_CHANNELS, 200);
    let mut gray = background.clone();
    for y in 200..240 {
        for x in 300..340 {
            gray.data[(y * WIDTH + x) as usize] = 40;
        }
    }
    let rgb = Frame::filled(WIDTH, HEIGHT, RGB_CHANNELS, 128);

    let detector = Detector::new(PipelineConfig::for_frame(WIDTH, HEIGHT))?;
    let (report, batch) = detector.detect_and_crop(&gray, &background, &rgb)?;

    println!(
        "locations: {} clusters: {} crops: {} ({:?})",
        report.locations.len(),
        report.clusters.len(),
        batch.crops.len(),
        report.elapsed
    );
    for crop in &batch.crops {
        let r = crop.region;
        println!(
            "  cluster {} -> ({}, {})..({}, {}) {}x{} via {:?}",
            r.cluster_index, r.x0, r.y0, r.x1, r.y1, r.width, r.height, r.source
        );
    }
    Ok(())
}
