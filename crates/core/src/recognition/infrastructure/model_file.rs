use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recognition::domain::face_classifier::ClassifierTrainer;
use crate::recognition::domain::label_map::LabelMap;
use crate::recognition::domain::model_slot::TrainedModel;
use crate::shared::person_name::PersonName;

const FORMAT_VERSION: u32 = 2;
const CLASSIFIER_EXTENSION: &str = "yml";

#[derive(Error, Debug)]
pub enum ModelFileError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed model file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported model file version {0}")]
    Version(u32),
    #[error("classifier file {0:?} must be a plain file name")]
    ClassifierName(String),
    #[error("cannot write classifier: {0}")]
    Save(String),
    #[error("cannot read classifier: {0}")]
    Classifier(String),
}

#[derive(Serialize, Deserialize)]
struct ModelDocument {
    version: u32,
    /// Names in label order.
    labels: Vec<PersonName>,
    /// Classifier state file, relative to the document's directory.
    classifier: String,
}

/// Persists a trained model as a JSON document holding the label map, next
/// to the classifier's own state file (`model.json` + `model.yml`).
pub struct ModelFile {
    path: PathBuf,
}

impl ModelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.path.with_extension(CLASSIFIER_EXTENSION)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Both files are written to temporary siblings first, then renamed over
    /// their targets, classifier before document.
    pub fn save(&self, model: &TrainedModel) -> Result<(), ModelFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(&self.path, e))?;
        }

        let classifier_path = self.classifier_path();
        let classifier_tmp = self.path.with_extension(format!("part.{CLASSIFIER_EXTENSION}"));
        if let Err(e) = model.classifier.save(&classifier_tmp) {
            let _ = fs::remove_file(&classifier_tmp);
            return Err(ModelFileError::Save(e.to_string()));
        }
        fs::rename(&classifier_tmp, &classifier_path)
            .map_err(|e| io_error(&classifier_path, e))?;

        let doc = ModelDocument {
            version: FORMAT_VERSION,
            labels: model.labels.names().to_vec(),
            classifier: file_name(&classifier_path),
        };
        let tmp = self.path.with_extension("json.part");
        let file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &doc).map_err(|e| ModelFileError::Format {
            path: tmp.clone(),
            source: e,
        })?;
        writer.flush().map_err(|e| io_error(&tmp, e))?;
        drop(writer);
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))?;

        log::info!(
            "Saved model ({} labels, {} samples) to {}",
            model.labels.len(),
            model.classifier.sample_count(),
            self.path.display()
        );
        Ok(())
    }

    /// `Ok(None)` when no model has been saved yet.
    pub fn load(
        &self,
        trainer: &dyn ClassifierTrainer,
    ) -> Result<Option<TrainedModel>, ModelFileError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        let doc: ModelDocument =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| ModelFileError::Format {
                path: self.path.clone(),
                source: e,
            })?;
        if doc.version != FORMAT_VERSION {
            return Err(ModelFileError::Version(doc.version));
        }
        let name = Path::new(&doc.classifier);
        if doc.classifier.is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(ModelFileError::ClassifierName(doc.classifier));
        }
        let classifier_path = self.path.with_file_name(name);
        let classifier = trainer
            .load(&classifier_path)
            .map_err(|e| ModelFileError::Classifier(e.to_string()))?;
        Ok(Some(TrainedModel {
            classifier,
            labels: LabelMap::new(doc.labels),
        }))
    }

    /// Removes the document and its classifier file. Returns whether the
    /// document existed.
    pub fn remove(&self) -> Result<bool, ModelFileError> {
        let classifier_path = self.classifier_path();
        match fs::remove_file(&classifier_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&classifier_path, e)),
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}

fn io_error(path: &Path, source: io::Error) -> ModelFileError {
    ModelFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
