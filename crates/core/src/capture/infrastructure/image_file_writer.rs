use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};

use crate::capture::domain::image_writer::ImageWriter;
use crate::shared::frame::Frame;

/// Saves frames with the `image` crate; the format follows the extension.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// `<dir>/frame_<index>.png`, the layout used when dumping annotated frames.
pub fn numbered_frame_path(dir: &Path, frame: &Frame) -> PathBuf {
    dir.join(format!("frame_{:05}.png", frame.index()))
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (w, h) = (frame.width(), frame.height());
        match frame.channels() {
            3 => RgbImage::from_raw(w, h, frame.data().to_vec())
                .ok_or("frame data does not match its dimensions")?
                .save(path)?,
            1 => GrayImage::from_raw(w, h, frame.data().to_vec())
                .ok_or("frame data does not match its dimensions")?
                .save(path)?,
            n => return Err(format!("cannot save a {n}-channel frame").into()),
        }
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}
