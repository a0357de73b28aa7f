use std::sync::Arc;

use image::GrayImage;
use thiserror::Error;

use crate::recognition::domain::face_classifier::ClassifierTrainer;
use crate::recognition::domain::label_map::{Label, LabelMap};
use crate::recognition::domain::model_slot::{ModelSlot, TrainedModel};
use crate::recognition::infrastructure::model_file::ModelFile;
use crate::registration::domain::sample_store::{SampleStore, StoreError};
use crate::shared::face_image::resize_to_canonical;
use crate::shared::person_name::PersonName;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("training is already in progress")]
    Busy,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("classifier training failed: {0}")]
    Classifier(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingSummary {
    pub persons: usize,
    pub images: usize,
    /// Persons left out because none of their samples could be loaded.
    pub skipped: Vec<PersonName>,
    pub persisted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// No registered persons; the previous model is kept.
    NoProfiles,
    /// Persons exist but no sample could be loaded; the previous model is kept.
    NoValidImages,
    /// The classifier is not available on this system.
    Unavailable,
    Trained(TrainingSummary),
}

/// Batch training: load corpus → assign labels → fit → persist → publish.
pub struct TrainModelUseCase {
    store: Arc<dyn SampleStore>,
    trainer: Arc<dyn ClassifierTrainer>,
    slot: ModelSlot,
    model_file: Option<ModelFile>,
    face_size: u32,
}

impl TrainModelUseCase {
    pub fn new(
        store: Arc<dyn SampleStore>,
        trainer: Arc<dyn ClassifierTrainer>,
        slot: ModelSlot,
        model_file: Option<ModelFile>,
        face_size: u32,
    ) -> Self {
        Self {
            store,
            trainer,
            slot,
            model_file,
            face_size,
        }
    }

    pub fn execute(&self) -> Result<TrainingOutcome, TrainingError> {
        let persons = self.store.persons()?;
        if persons.is_empty() {
            log::info!("No registered persons, nothing to train");
            return Ok(TrainingOutcome::NoProfiles);
        }

        let mut corpus: Vec<(PersonName, Vec<GrayImage>)> = Vec::with_capacity(persons.len());
        let mut skipped = Vec::new();
        for person in persons {
            let faces = self.load_faces(&person)?;
            if faces.is_empty() {
                log::warn!("No valid images for {person}, skipping");
                skipped.push(person);
            } else {
                log::info!("Loaded {} images for {person}", faces.len());
                corpus.push((person, faces));
            }
        }
        if corpus.is_empty() {
            return Ok(TrainingOutcome::NoValidImages);
        }

        let labels = LabelMap::new(corpus.iter().map(|(name, _)| name.clone()));
        let mut faces = Vec::new();
        let mut face_labels: Vec<Label> = Vec::new();
        for (name, person_faces) in corpus {
            let Some(label) = labels.label(&name) else {
                continue;
            };
            face_labels.extend(std::iter::repeat(label).take(person_faces.len()));
            faces.extend(person_faces);
        }

        let classifier = self
            .trainer
            .train(&faces, &face_labels)
            .map_err(|e| TrainingError::Classifier(e.to_string()))?;
        let model = TrainedModel { classifier, labels };

        let persisted = match &self.model_file {
            Some(file) => match file.save(&model) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Model trained but not saved: {e}");
                    false
                }
            },
            None => false,
        };

        let summary = TrainingSummary {
            persons: model.labels.len(),
            images: faces.len(),
            skipped,
            persisted,
        };
        self.slot.publish(model);
        log::info!(
            "Training complete: {} persons, {} images",
            summary.persons,
            summary.images
        );
        Ok(TrainingOutcome::Trained(summary))
    }

    fn load_faces(&self, person: &PersonName) -> Result<Vec<GrayImage>, StoreError> {
        let mut faces = Vec::new();
        for sample in self.store.samples(person)? {
            match self.store.load_sample(&sample) {
                Ok(img) => faces.push(resize_to_canonical(&img, self.face_size)),
                Err(e) => log::warn!("Skipping sample: {e}"),
            }
        }
        Ok(faces)
    }
}
