use std::path::Path;

use image::GrayImage;
use thiserror::Error;

use crate::detection::domain::detector_params::{DetectorParams, DetectorParamsError};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::model_resolver::{self, ModelResolveError, ProgressFn};
use crate::shared::constants::{DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL};
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum DetectorLoadError {
    #[error("invalid detector parameters: {0}")]
    Params(#[from] DetectorParamsError),
    #[error(transparent)]
    Resolve(#[from] ModelResolveError),
    #[error("detector model path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
    #[error("failed to load detector model from {path}: {message}")]
    Model { path: String, message: String },
}

/// Frontal face detector backed by the SeetaFace funnel-structured
/// cascade (`rustface`).
///
/// The pretrained model is loaded once at construction; a missing or
/// corrupt model is an unrecoverable startup error.
pub struct SeetaFaceDetector {
    inner: Box<dyn rustface::Detector>,
    params: DetectorParams,
}

// Safety: the detector is owned by exactly one capture worker at a time
// and never shared between threads.
unsafe impl Send for SeetaFaceDetector {}

impl SeetaFaceDetector {
    pub fn new(model_path: &Path, params: DetectorParams) -> Result<Self, DetectorLoadError> {
        params.validate()?;
        let path = model_path
            .to_str()
            .ok_or_else(|| DetectorLoadError::NonUtf8Path(model_path.display().to_string()))?;

        let mut inner =
            rustface::create_detector(path).map_err(|e| DetectorLoadError::Model {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        inner.set_min_face_size(params.min_face_size);
        if params.max_face_size > 0 {
            inner.set_max_face_size(params.max_face_size);
        }
        inner.set_pyramid_scale_factor(params.pyramid_scale_factor);
        inner.set_score_thresh(params.score_threshold);
        inner.set_slide_window_step(params.window_step, params.window_step);

        log::info!("Loaded face detector model from {path}");
        Ok(Self { inner, params })
    }

    /// Locates the model file (explicit path, cache, bundled dir, download)
    /// and loads it.
    pub fn resolve(
        explicit_model: Option<&Path>,
        bundled_dir: Option<&Path>,
        params: DetectorParams,
        progress: Option<ProgressFn>,
    ) -> Result<Self, DetectorLoadError> {
        params.validate()?;
        let path = model_resolver::resolve(
            DETECTOR_MODEL_NAME,
            DETECTOR_MODEL_URL,
            explicit_model,
            bundled_dir,
            progress,
        )?;
        Self::new(&path, params)
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let (width, height) = gray.dimensions();
        // The cascade cannot scan an image smaller than its smallest window.
        if width < self.params.min_face_size || height < self.params.min_face_size {
            return Ok(Vec::new());
        }

        let image = rustface::ImageData::new(gray.as_raw(), width, height);
        let regions: Vec<Region> = self
            .inner
            .detect(&image)
            .into_iter()
            .map(|face| {
                let bbox = face.bbox();
                Region::new(bbox.x(), bbox.y(), bbox.width() as i32, bbox.height() as i32)
            })
            .collect();

        Ok(self.params.filter(&regions))
    }
}
