use std::path::Path;

use crate::capture::domain::image_writer::ImageWriter;
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::overlay;
use crate::shared::face_image::equalized_gray;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Single-image detection: read → equalise → detect → outline → write.
pub struct DetectImageUseCase {
    detector: Box<dyn FaceDetector>,
    image_writer: Box<dyn ImageWriter>,
}

impl DetectImageUseCase {
    pub fn new(detector: Box<dyn FaceDetector>, image_writer: Box<dyn ImageWriter>) -> Self {
        Self {
            detector,
            image_writer,
        }
    }

    /// Returns the detected faces; the annotated image is written only
    /// when `output_path` is given.
    pub fn execute(
        &mut self,
        input_path: &Path,
        output_path: Option<&Path>,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let rgb = image::open(input_path)
            .map_err(|e| format!("{}: {e}", input_path.display()))?
            .to_rgb8();
        let mut frame = Frame::from_rgb_image(rgb, 0);

        let gray = equalized_gray(&frame)?;
        let faces = self.detector.detect(&gray)?;
        log::info!("{} face(s) in {}", faces.len(), input_path.display());

        if let Some(output) = output_path {
            overlay::draw_detections(&mut frame, &faces);
            self.image_writer.write(output, &frame)?;
        }
        Ok(faces)
    }
}
