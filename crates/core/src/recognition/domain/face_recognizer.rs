use image::GrayImage;

use crate::recognition::domain::identity::{Identity, Recognition};
use crate::recognition::domain::model_slot::ModelSlot;
use crate::shared::face_image::crop_face;
use crate::shared::region::Region;

/// Identifies detected faces against whatever model the slot holds.
pub struct FaceRecognizer {
    slot: ModelSlot,
    threshold: f64,
    face_size: u32,
}

impl FaceRecognizer {
    pub fn new(slot: ModelSlot, threshold: f64, face_size: u32) -> Self {
        Self {
            slot,
            threshold,
            face_size,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `None` when no usable model is loaded; recognition is then skipped
    /// for the frame. Faces that cannot be cropped are left out.
    pub fn recognize(
        &self,
        gray: &GrayImage,
        faces: &[Region],
    ) -> Result<Option<Vec<Recognition>>, Box<dyn std::error::Error>> {
        let Some(model) = self.slot.snapshot() else {
            return Ok(None);
        };
        let mut results = Vec::with_capacity(faces.len());
        for region in faces {
            let Some(face) = crop_face(gray, region, self.face_size) else {
                continue;
            };
            let prediction = model.classifier.predict(&face)?;
            let identity = Identity::decide(&prediction, &model.labels, self.threshold);
            log::debug!(
                "Face at ({}, {}): {identity} [distance {:.2}]",
                region.x,
                region.y,
                prediction.distance
            );
            results.push(Recognition {
                region: *region,
                identity,
                distance: prediction.distance,
            });
        }
        Ok(Some(results))
    }
}
