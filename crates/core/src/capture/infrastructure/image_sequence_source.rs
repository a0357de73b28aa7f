use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{FrameSource, SourceInfo};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays the still images of a directory, in file name order, as frames.
pub struct ImageSequenceSource {
    dir: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    position: usize,
    frame_index: usize,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            looping: false,
            files: Vec::new(),
            position: 0,
            frame_index: 0,
        }
    }

    /// Restart from the first image instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();
        let first = files
            .first()
            .ok_or_else(|| format!("no images in {}", self.dir.display()))?;
        let (width, height) = image::image_dimensions(first)?;

        log::info!(
            "Replaying {} images from {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.position = 0;
        self.frame_index = 0;
        Ok(SourceInfo {
            width,
            height,
            description: self.dir.display().to_string(),
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.files.is_empty() {
            return Err("ImageSequenceSource: not opened".into());
        }
        if self.position >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }
        let path = &self.files[self.position];
        self.position += 1;
        let rgb = image::open(path)
            .map_err(|e| format!("{}: {e}", path.display()))?
            .to_rgb8();
        let frame = Frame::from_rgb_image(rgb, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.files.clear();
        self.position = 0;
    }
}
