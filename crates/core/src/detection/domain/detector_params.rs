use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::region::{Region, DEFAULT_IOU_THRESHOLD};

/// Smallest window the cascade supports.
pub const MIN_WINDOW_SIZE: u32 = 20;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorParamsError {
    #[error("min_face_size must be at least {MIN_WINDOW_SIZE}, got {0}")]
    MinFaceSize(u32),
    #[error("max_face_size ({max}) is smaller than min_face_size ({min})")]
    MaxBelowMin { min: u32, max: u32 },
    #[error("pyramid_scale_factor must lie in (0.01, 0.99), got {0}")]
    ScaleFactor(f32),
    #[error("score_threshold must be positive, got {0}")]
    ScoreThreshold(f64),
    #[error("window_step must be positive")]
    WindowStep,
}

/// Cascade tuning knobs.
///
/// `pyramid_scale_factor` is the ratio between adjacent pyramid levels
/// (0.8 corresponds to a 1.25 upscaling step of the search window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub min_face_size: u32,
    /// 0 disables the upper bound.
    pub max_face_size: u32,
    pub pyramid_scale_factor: f32,
    pub score_threshold: f64,
    pub window_step: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_face_size: 100,
            max_face_size: 300,
            pyramid_scale_factor: 0.8,
            score_threshold: 2.0,
            window_step: 4,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), DetectorParamsError> {
        if self.min_face_size < MIN_WINDOW_SIZE {
            return Err(DetectorParamsError::MinFaceSize(self.min_face_size));
        }
        if self.max_face_size != 0 && self.max_face_size < self.min_face_size {
            return Err(DetectorParamsError::MaxBelowMin {
                min: self.min_face_size,
                max: self.max_face_size,
            });
        }
        if !(self.pyramid_scale_factor > 0.01 && self.pyramid_scale_factor < 0.99) {
            return Err(DetectorParamsError::ScaleFactor(self.pyramid_scale_factor));
        }
        if self.score_threshold <= 0.0 {
            return Err(DetectorParamsError::ScoreThreshold(self.score_threshold));
        }
        if self.window_step == 0 {
            return Err(DetectorParamsError::WindowStep);
        }
        Ok(())
    }

    /// Drops detections outside the size bounds and collapses overlapping
    /// duplicates, keeping the earlier (higher scored) box.
    pub fn filter(&self, regions: &[Region]) -> Vec<Region> {
        let sized: Vec<Region> = regions
            .iter()
            .filter(|r| r.fits(self.min_face_size, self.max_face_size))
            .copied()
            .collect();
        Region::deduplicate(&sized, DEFAULT_IOU_THRESHOLD)
    }
}
