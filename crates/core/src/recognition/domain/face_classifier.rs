use std::path::Path;

use image::GrayImage;

use crate::recognition::domain::label_map::Label;

/// Nearest-match result for one face.
///
/// `distance` is lower for closer matches. `label` is `None` when the
/// classifier's own acceptance threshold rejected every candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: Option<Label>,
    pub distance: f64,
}

/// A trained face classifier. Immutable once trained; shared between the
/// capture worker and whoever owns the model slot.
pub trait FaceClassifier: Send + Sync {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, Box<dyn std::error::Error>>;

    /// Number of training samples the model was fitted on.
    fn sample_count(&self) -> usize;

    /// Writes the trained state to `path`, readable with [`ClassifierTrainer::load`].
    fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>>;
}

/// Fits classifiers from a labelled corpus in one batch.
pub trait ClassifierTrainer: Send + Sync {
    fn train(
        &self,
        faces: &[GrayImage],
        labels: &[Label],
    ) -> Result<Box<dyn FaceClassifier>, Box<dyn std::error::Error>>;

    fn load(&self, path: &Path) -> Result<Box<dyn FaceClassifier>, Box<dyn std::error::Error>>;
}
