use std::path::Path;

use crate::shared::frame::Frame;

/// Interface for saving a frame as a still image.
pub trait ImageWriter: Send {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
