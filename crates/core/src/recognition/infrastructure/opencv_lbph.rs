use std::path::Path;
use std::sync::{Mutex, PoisonError};

use image::GrayImage;
use opencv::core::{Mat, Ptr, Scalar, Vector, CV_8UC1};
use opencv::face::LBPHFaceRecognizer;
use opencv::prelude::{
    FaceRecognizerTrait, FaceRecognizerTraitConst, LBPHFaceRecognizerTraitConst, MatTraitManual,
};

use crate::recognition::domain::face_classifier::{ClassifierTrainer, FaceClassifier, Prediction};
use crate::recognition::domain::label_map::Label;
use crate::recognition::infrastructure::lbph::{LbphError, LbphParams};

/// OpenCV recognizer handle.
struct Recognizer(Ptr<LBPHFaceRecognizer>);

// SAFETY: the handle owns its recognizer exclusively and is only reached
// through the `Mutex` in `LbphModel`, so OpenCV never sees concurrent calls.
unsafe impl Send for Recognizer {}

/// Builds classifiers on `cv::face::LBPHFaceRecognizer`.
#[derive(Clone, Debug)]
pub struct LbphTrainer {
    params: LbphParams,
}

impl LbphTrainer {
    /// Creates one recognizer up front so a broken face module surfaces
    /// here instead of at the first training run.
    pub fn new(params: LbphParams) -> Result<Self, LbphError> {
        create(&params)?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &LbphParams {
        &self.params
    }

    pub fn fit(&self, faces: &[GrayImage], labels: &[Label]) -> Result<LbphModel, LbphError> {
        if faces.is_empty() {
            return Err(LbphError::EmptyTrainingSet);
        }
        if faces.len() != labels.len() {
            return Err(LbphError::LabelCountMismatch {
                faces: faces.len(),
                labels: labels.len(),
            });
        }
        let mut images = Vector::<Mat>::new();
        for face in faces {
            images.push(to_mat(face)?);
        }
        let labels = labels
            .iter()
            .map(|&l| i32::try_from(l).map_err(|_| LbphError::Label(l)))
            .collect::<Result<Vector<i32>, _>>()?;

        let mut recognizer = create(&self.params)?;
        recognizer.train(&images, &labels).map_err(backend)?;
        log::debug!("LBPH fitted {} samples", faces.len());
        Ok(LbphModel::new(recognizer, faces.len()))
    }

    /// Reads a recognizer written by [`FaceClassifier::save`].
    pub fn read(&self, path: &Path) -> Result<LbphModel, LbphError> {
        let file = utf8(path)?;
        let mut recognizer = create(&self.params)?;
        recognizer.read(file).map_err(backend)?;
        let samples = recognizer.get_histograms().map_err(backend)?.len();
        Ok(LbphModel::new(recognizer, samples))
    }
}

impl ClassifierTrainer for LbphTrainer {
    fn train(
        &self,
        faces: &[GrayImage],
        labels: &[Label],
    ) -> Result<Box<dyn FaceClassifier>, Box<dyn std::error::Error>> {
        Ok(Box::new(self.fit(faces, labels)?))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn FaceClassifier>, Box<dyn std::error::Error>> {
        Ok(Box::new(self.read(path)?))
    }
}

/// A trained OpenCV LBPH recognizer.
pub struct LbphModel {
    recognizer: Mutex<Recognizer>,
    samples: usize,
}

impl LbphModel {
    fn new(recognizer: Ptr<LBPHFaceRecognizer>, samples: usize) -> Self {
        Self {
            recognizer: Mutex::new(Recognizer(recognizer)),
            samples,
        }
    }

    /// OpenCV reports a rejected face as label `-1` at `f64::MAX`.
    pub fn predict_face(&self, face: &GrayImage) -> Result<Prediction, LbphError> {
        let mat = to_mat(face)?;
        let recognizer = self.recognizer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut label = -1;
        let mut distance = f64::MAX;
        recognizer
            .0
            .predict(&mat, &mut label, &mut distance)
            .map_err(backend)?;
        Ok(Prediction {
            label: Label::try_from(label).ok(),
            distance,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), LbphError> {
        let file = utf8(path)?;
        let recognizer = self.recognizer.lock().unwrap_or_else(PoisonError::into_inner);
        recognizer.0.write(file).map_err(backend)
    }
}

impl FaceClassifier for LbphModel {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, Box<dyn std::error::Error>> {
        Ok(self.predict_face(face)?)
    }

    fn sample_count(&self) -> usize {
        self.samples
    }

    fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        Ok(self.write(path)?)
    }
}

fn create(params: &LbphParams) -> Result<Ptr<LBPHFaceRecognizer>, LbphError> {
    LBPHFaceRecognizer::create(
        params.radius as i32,
        params.neighbors as i32,
        params.grid_x as i32,
        params.grid_y as i32,
        params.threshold,
    )
    .map_err(backend)
}

fn to_mat(face: &GrayImage) -> Result<Mat, LbphError> {
    let (width, height) = face.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))
            .map_err(backend)?;
    mat.data_bytes_mut()
        .map_err(backend)?
        .copy_from_slice(face.as_raw());
    Ok(mat)
}

fn utf8(path: &Path) -> Result<&str, LbphError> {
    path.to_str()
        .ok_or_else(|| LbphError::Path(path.display().to_string()))
}

fn backend(e: opencv::Error) -> LbphError {
    LbphError::Backend(e.to_string())
}
