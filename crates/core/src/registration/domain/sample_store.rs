use std::io;
use std::path::PathBuf;

use image::GrayImage;
use thiserror::Error;

use crate::shared::person_name::PersonName;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode sample {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("failed to encode sample {path}: {message}")]
    Encode { path: PathBuf, message: String },
}

/// A persisted face sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSample {
    pub person: PersonName,
    /// Sequence number parsed from the file name, when it follows the
    /// `face_NNN` convention.
    pub index: Option<usize>,
    pub path: PathBuf,
}

/// Storage for registered face samples, one collection per person.
pub trait SampleStore: Send + Sync {
    /// Registered persons in sorted order.
    fn persons(&self) -> Result<Vec<PersonName>, StoreError>;

    fn exists(&self, person: &PersonName) -> Result<bool, StoreError>;

    /// Stores `face` as sample `index` of `person`, creating the person on
    /// first use.
    fn add_sample(
        &self,
        person: &PersonName,
        index: usize,
        face: &GrayImage,
    ) -> Result<StoredSample, StoreError>;

    /// Samples in index order.
    fn samples(&self, person: &PersonName) -> Result<Vec<StoredSample>, StoreError>;

    fn load_sample(&self, sample: &StoredSample) -> Result<GrayImage, StoreError>;

    /// Returns whether the person existed.
    fn delete_person(&self, person: &PersonName) -> Result<bool, StoreError>;

    /// Removes every person. Returns how many were removed.
    fn clear(&self) -> Result<usize, StoreError>;

    fn sample_count(&self, person: &PersonName) -> Result<usize, StoreError> {
        Ok(self.samples(person)?.len())
    }
}
