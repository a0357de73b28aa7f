use image::GrayImage;

use crate::shared::region::Region;

/// Domain interface for face detection.
///
/// Input is a grayscale, histogram-equalised frame. Implementations may
/// keep scratch buffers between calls, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
