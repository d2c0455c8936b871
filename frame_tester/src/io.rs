//! File-system side of the harness: captures in, crops out.

use anyhow::{Context, Result};
use insect_vision::core_modules::frame::Frame;
use insect_vision::pipeline::CropBatch;
use insect_vision::PipelineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Loads one capture as the grayscale and RGB frames a detection cycle needs.
pub fn load_capture(path: &Path) -> Result<(Frame, Frame)> {
    let image = image::open(path).with_context(|| format!("failed to open capture {}", path.display()))?;
    let gray = Frame::from(image.to_luma8());
    let rgb = Frame::from(image.to_rgb8());
    debug!(path = %path.display(), width = gray.width, height = gray.height, "capture loaded");
    Ok((gray, rgb))
}

pub fn load_gray(path: &Path) -> Result<Frame> {
    let image = image::open(path).with_context(|| format!("failed to open image {}", path.display()))?;
    Ok(Frame::from(image.to_luma8()))
}

/// Reads a (possibly partial) JSON config, or the defaults, sized to the capture.
pub fn load_config(path: Option<&Path>, width: u32, height: u32) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<PipelineConfig>(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if (config.image_width, config.image_height) != (width, height) {
        if path.is_some() {
            warn!(
                configured = ?(config.image_width, config.image_height),
                capture = ?(width, height),
                "config frame size overridden by capture size"
            );
        }
        config.image_width = width;
        config.image_height = height;
    }
    Ok(config)
}

/// Writes every extracted crop as `<stem>_crop<N>.png` under `dir`.
pub fn save_crops(batch: &CropBatch, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::with_capacity(batch.crops.len());
    for crop in &batch.crops {
        let path = dir.join(format!("{stem}_crop{}.png", crop.region.cluster_index));
        crop.image
            .clone()
            .into_rgb_image()?
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_captures(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut captures: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    captures.sort();
    Ok(captures)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("capture")
        .to_string()
}
