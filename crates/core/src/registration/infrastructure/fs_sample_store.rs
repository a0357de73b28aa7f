use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::registration::domain::sample_store::{SampleStore, StoreError, StoredSample};
use crate::shared::constants::{SAMPLE_EXTENSIONS, SAMPLE_FILE_PREFIX};
use crate::shared::person_name::PersonName;

/// Stores samples as `<root>/<name>/face_NNN.<ext>`.
pub struct FsSampleStore {
    root: PathBuf,
    extension: String,
}

impl FsSampleStore {
    /// `extension` selects the format new samples are written in; unknown
    /// extensions fall back to png.
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        let extension = if SAMPLE_EXTENSIONS.contains(&normalized.as_str()) {
            normalized
        } else {
            log::warn!("Unsupported sample extension {extension:?}, using png");
            "png".to_string()
        };
        Self {
            root: root.into(),
            extension,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn person_dir(&self, person: &PersonName) -> PathBuf {
        self.root.join(person.as_str())
    }

    fn sample_path(&self, person: &PersonName, index: usize) -> PathBuf {
        self.person_dir(person)
            .join(format!("{SAMPLE_FILE_PREFIX}{index:03}.{}", self.extension))
    }
}

fn io_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_sample_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SAMPLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

fn sample_index(path: &Path) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(SAMPLE_FILE_PREFIX)?
        .parse()
        .ok()
}

impl SampleStore for FsSampleStore {
    fn persons(&self) -> Result<Vec<PersonName>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };
        let mut persons = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.root, e))?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match PersonName::parse(dir_name) {
                Ok(name) => persons.push(name),
                Err(e) => log::debug!("Ignoring directory {}: {e}", path.display()),
            }
        }
        persons.sort();
        Ok(persons)
    }

    fn exists(&self, person: &PersonName) -> Result<bool, StoreError> {
        Ok(self.person_dir(person).is_dir())
    }

    fn add_sample(
        &self,
        person: &PersonName,
        index: usize,
        face: &GrayImage,
    ) -> Result<StoredSample, StoreError> {
        let dir = self.person_dir(person);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let path = self.sample_path(person, index);
        face.save(&path).map_err(|e| StoreError::Encode {
            path: path.clone(),
            message: e.to_string(),
        })?;
        log::debug!("Saved {}", path.display());
        Ok(StoredSample {
            person: person.clone(),
            index: Some(index),
            path,
        })
    }

    fn samples(&self, person: &PersonName) -> Result<Vec<StoredSample>, StoreError> {
        let dir = self.person_dir(person);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };
        let mut samples = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&dir, e))?.path();
            if is_sample_file(&path) {
                samples.push(StoredSample {
                    person: person.clone(),
                    index: sample_index(&path),
                    path,
                });
            }
        }
        samples.sort_by(|a, b| {
            let ka = (a.index.unwrap_or(usize::MAX), &a.path);
            let kb = (b.index.unwrap_or(usize::MAX), &b.path);
            ka.cmp(&kb)
        });
        Ok(samples)
    }

    fn load_sample(&self, sample: &StoredSample) -> Result<GrayImage, StoreError> {
        let img = image::open(&sample.path).map_err(|e| StoreError::Decode {
            path: sample.path.clone(),
            message: e.to_string(),
        })?;
        Ok(img.to_luma8())
    }

    fn delete_person(&self, person: &PersonName) -> Result<bool, StoreError> {
        let dir = self.person_dir(person);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::info!("Deleted {}", dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&dir, e)),
        }
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for person in self.persons()? {
            if self.delete_person(&person)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn name(s: &str) -> PersonName {
        PersonName::parse(s).unwrap()
    }

    fn face(v: u8) -> GrayImage {
        GrayImage::from_pixel(16, 16, Luma([v]))
    }

    #[test]
    fn test_missing_root_has_no_persons() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path().join("absent"), "png");
        assert!(store.persons().unwrap().is_empty());
        assert!(!store.exists(&name("alice")).unwrap());
        assert!(store.samples(&name("alice")).unwrap().is_empty());
    }

    #[test]
    fn test_add_sample_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path(), "png");
        let sample = store.add_sample(&name("alice"), 7, &face(100)).unwrap();
        assert_eq!(sample.path, dir.path().join("alice").join("face_007.png"));
        assert!(sample.path.is_file());
        assert!(store.exists(&name("alice")).unwrap());
    }

    #[test]
    fn test_persons_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path(), "png");
        store.add_sample(&name("carol"), 0, &face(1)).unwrap();
        store.add_sample(&name("alice"), 0, &face(1)).unwrap();
        fs::create_dir(dir.path().join("not a name")).unwrap();
        fs::write(dir.path().join("model.json"), b"{}").unwrap();

        let persons = store.persons().unwrap();
        assert_eq!(persons, vec![name("alice"), name("carol")]);
    }

    #[test]
    fn test_samples_in_index_order_with_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path(), "png");
        for i in [10, 2, 1000] {
            store.add_sample(&name("bob"), i, &face(50)).unwrap();
        }
        let person_dir = dir.path().join("bob");
        face(9).save(person_dir.join("extra.jpg")).unwrap();
        fs::write(person_dir.join("notes.txt"), b"x").unwrap();

        let samples = store.samples(&name("bob")).unwrap();
        let indices: Vec<_> = samples.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![Some(2), Some(10), Some(1000), None]);
        assert_eq!(store.sample_count(&name("bob")).unwrap(), 4);
    }

    #[test]
    fn test_load_sample_is_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path(), "png");
        let sample = store.add_sample(&name("alice"), 0, &face(123)).unwrap();
        let loaded = store.load_sample(&sample).unwrap();
        assert_eq!(loaded.dimensions(), (16, 16));
        assert_eq!(loaded.get_pixel(3, 3).0, [123]);
    }

    #[test]
    fn test_corrupt_sample_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path(), "png");
        let person_dir = dir.path().join("alice");
        fs::create_dir_all(&person_dir).unwrap();
        fs::write(person_dir.join("face_000.png"), b"garbage").unwrap();

        let samples = store.samples(&name("alice")).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(matches!(
            store.load_sample(&samples[0]),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSampleStore::new(dir.path(), "png");
        store.add_sample(&name("alice"), 0, &face(1)).unwrap();
        store.add_sample(&name("bob"), 0, &face(1)).unwrap();
        fs::write(dir.path().join("model.json"), b"{}").unwrap();

        assert!(store.delete_person(&name("alice")).unwrap());
        assert!(!store.delete_person(&name("alice")).unwrap());
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.persons().unwrap().is_empty());
        assert!(dir.path().join("model.json").exists());
    }

    #[test]
    fn test_extension_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let jpg = FsSampleStore::new(dir.path(), ".JPG");
        let sample = jpg.add_sample(&name("a"), 0, &face(1)).unwrap();
        assert_eq!(sample.path.extension().unwrap(), "jpg");

        let fallback = FsSampleStore::new(dir.path(), "gif");
        let sample = fallback.add_sample(&name("b"), 0, &face(1)).unwrap();
        assert_eq!(sample.path.extension().unwrap(), "png");
    }
}
