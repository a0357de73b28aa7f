use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recognition::domain::face_classifier::ClassifierTrainer;
use crate::recognition::domain::label_map::Label;

/// Upper bound on sampling points; each cell histogram has `2^neighbors` bins.
pub const MAX_NEIGHBORS: u32 = 16;

#[derive(Error, Debug)]
pub enum LbphError {
    #[error("radius must be at least 1")]
    Radius,
    #[error("neighbors must be in 1..={MAX_NEIGHBORS}, got {0}")]
    Neighbors(u32),
    #[error("grid must be at least 1x1, got {0}x{1}")]
    Grid(u32, u32),
    #[error("threshold must be positive, got {0}")]
    Threshold(f64),
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("{faces} faces but {labels} labels")]
    LabelCountMismatch { faces: usize, labels: usize },
    #[error("label {0} does not fit the classifier's label type")]
    Label(Label),
    #[error("model path {0} is not valid UTF-8")]
    Path(String),
    #[error("built without the OpenCV face module")]
    Unavailable,
    #[error("OpenCV: {0}")]
    Backend(String),
}

/// Local Binary Patterns Histograms parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbphParams {
    pub radius: u32,
    pub neighbors: u32,
    pub grid_x: u32,
    pub grid_y: u32,
    /// Nearest distances at or above this leave the prediction unlabelled.
    pub threshold: f64,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            radius: 1,
            neighbors: 8,
            grid_x: 8,
            grid_y: 8,
            threshold: 100.0,
        }
    }
}

impl LbphParams {
    pub fn validate(&self) -> Result<(), LbphError> {
        if self.radius == 0 {
            return Err(LbphError::Radius);
        }
        if self.neighbors == 0 || self.neighbors > MAX_NEIGHBORS {
            return Err(LbphError::Neighbors(self.neighbors));
        }
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(LbphError::Grid(self.grid_x, self.grid_y));
        }
        if self.threshold.is_nan() || self.threshold <= 0.0 {
            return Err(LbphError::Threshold(self.threshold));
        }
        Ok(())
    }
}

/// Checks once whether the LBPH classifier can be built with `params`.
///
/// `None` disables recognition for the lifetime of the process;
/// registration keeps working without it.
pub fn load_trainer(params: &LbphParams) -> Option<Arc<dyn ClassifierTrainer>> {
    match create_trainer(params) {
        Ok(trainer) => {
            log::debug!("LBPH classifier available: {params:?}");
            Some(trainer)
        }
        Err(e) => {
            log::warn!("LBPH classifier unavailable, recognition disabled: {e}");
            None
        }
    }
}

#[cfg(feature = "opencv")]
fn create_trainer(params: &LbphParams) -> Result<Arc<dyn ClassifierTrainer>, LbphError> {
    params.validate()?;
    let trainer = super::opencv_lbph::LbphTrainer::new(params.clone())?;
    Ok(Arc::new(trainer))
}

#[cfg(not(feature = "opencv"))]
fn create_trainer(params: &LbphParams) -> Result<Arc<dyn ClassifierTrainer>, LbphError> {
    params.validate()?;
    Err(LbphError::Unavailable)
}
