pub mod face_classifier;
pub mod face_recognizer;
pub mod identity;
pub mod label_map;
pub mod model_slot;
