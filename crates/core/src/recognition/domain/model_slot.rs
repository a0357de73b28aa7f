use std::sync::{Arc, PoisonError, RwLock};

use crate::recognition::domain::face_classifier::FaceClassifier;
use crate::recognition::domain::label_map::LabelMap;

/// A classifier together with the label map it was trained against.
pub struct TrainedModel {
    pub classifier: Box<dyn FaceClassifier>,
    pub labels: LabelMap,
}

/// Single-writer holder of the current model.
///
/// Readers take an `Arc` snapshot and never observe a half-updated
/// classifier/label pair; training completion replaces the whole value.
#[derive(Clone, Default)]
pub struct ModelSlot {
    current: Arc<RwLock<Option<Arc<TrainedModel>>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current model, if one is usable for recognition.
    pub fn snapshot(&self) -> Option<Arc<TrainedModel>> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().filter(|m| !m.labels.is_empty()).cloned()
    }

    pub fn publish(&self, model: TrainedModel) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::new(model));
    }

    pub fn clear(&self) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::face_classifier::Prediction;
    use crate::shared::person_name::PersonName;
    use image::GrayImage;

    struct FixedClassifier(f64);

    impl FaceClassifier for FixedClassifier {
        fn predict(&self, _face: &GrayImage) -> Result<Prediction, Box<dyn std::error::Error>> {
            Ok(Prediction {
                label: Some(0),
                distance: self.0,
            })
        }

        fn sample_count(&self) -> usize {
            1
        }

        fn save(&self, _path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    fn model(distance: f64, names: &[&str]) -> TrainedModel {
        TrainedModel {
            classifier: Box::new(FixedClassifier(distance)),
            labels: LabelMap::new(names.iter().map(|n| PersonName::parse(n).unwrap())),
        }
    }

    #[test]
    fn test_empty_slot_is_not_ready() {
        let slot = ModelSlot::new();
        assert!(!slot.is_ready());
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn test_publish_makes_ready() {
        let slot = ModelSlot::new();
        slot.publish(model(1.0, &["alice"]));
        assert!(slot.is_ready());
    }

    #[test]
    fn test_empty_label_map_is_not_ready() {
        let slot = ModelSlot::new();
        slot.publish(model(1.0, &[]));
        assert!(!slot.is_ready());
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let slot = ModelSlot::new();
        slot.publish(model(1.0, &["alice"]));
        let old = slot.snapshot().unwrap();

        slot.publish(model(2.0, &["bob", "carol"]));

        let face = GrayImage::new(4, 4);
        assert_eq!(old.classifier.predict(&face).unwrap().distance, 1.0);
        assert_eq!(old.labels.len(), 1);
        let new = slot.snapshot().unwrap();
        assert_eq!(new.classifier.predict(&face).unwrap().distance, 2.0);
        assert_eq!(new.labels.len(), 2);
    }

    #[test]
    fn test_clear_disables() {
        let slot = ModelSlot::new();
        let reader = slot.clone();
        slot.publish(model(1.0, &["alice"]));
        slot.clear();
        assert!(!reader.is_ready());
    }
}
