use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::overlay;
use crate::recognition::domain::face_recognizer::FaceRecognizer;
use crate::recognition::domain::identity::Recognition;
use crate::registration::domain::registration_session::{
    CaptureOutcome, RegistrationError, RegistrationSession,
};
use crate::registration::domain::sample_store::SampleStore;
use crate::shared::face_image::equalized_gray;
use crate::shared::frame::Frame;
use crate::shared::person_name::PersonName;
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("preprocessing failed: {0}")]
    Preprocess(String),
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("recognition failed: {0}")]
    Recognition(String),
}

/// Which branch handled a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMode {
    Registering,
    Recognizing,
    /// No registration and no model: faces are only outlined.
    Detecting,
}

pub struct FrameReport {
    /// The input frame with overlays drawn.
    pub frame: Frame,
    pub faces: Vec<Region>,
    pub mode: FrameMode,
    pub capture: CaptureOutcome,
    pub recognitions: Vec<Recognition>,
}

/// Per-frame pipeline: mirror → grayscale/equalise → detect →
/// registration or recognition → overlay.
pub struct ProcessFrameUseCase {
    detector: Box<dyn FaceDetector>,
    registration: Arc<Mutex<RegistrationSession>>,
    store: Arc<dyn SampleStore>,
    recognizer: FaceRecognizer,
    mirror: bool,
}

impl ProcessFrameUseCase {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        registration: Arc<Mutex<RegistrationSession>>,
        store: Arc<dyn SampleStore>,
        recognizer: FaceRecognizer,
        mirror: bool,
    ) -> Self {
        Self {
            detector,
            registration,
            store,
            recognizer,
            mirror,
        }
    }

    pub fn execute(&mut self, mut frame: Frame, now: Instant) -> Result<FrameReport, FrameError> {
        if self.mirror {
            frame.mirror();
        }
        let gray = equalized_gray(&frame).map_err(|e| FrameError::Preprocess(e.to_string()))?;
        let faces = self
            .detector
            .detect(&gray)
            .map_err(|e| FrameError::Detection(e.to_string()))?;

        {
            let mut registration = self
                .registration
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if registration.is_registering() {
                let capture = registration.process(&gray, &faces, now, &*self.store)?;
                if matches!(capture, CaptureOutcome::Completed { .. }) {
                    registration.finish();
                }
                let captured = match &capture {
                    CaptureOutcome::Captured { captured, .. }
                    | CaptureOutcome::Completed { captured, .. } => *captured,
                    _ => registration.progress().captured(),
                };
                overlay::draw_registration(&mut frame, &faces, captured, registration.target());
                return Ok(FrameReport {
                    frame,
                    faces,
                    mode: FrameMode::Registering,
                    capture,
                    recognitions: Vec::new(),
                });
            }
        }

        let recognized = self
            .recognizer
            .recognize(&gray, &faces)
            .map_err(|e| FrameError::Recognition(e.to_string()))?;
        let (mode, recognitions) = match recognized {
            Some(recognitions) => {
                overlay::draw_recognitions(&mut frame, &recognitions);
                (FrameMode::Recognizing, recognitions)
            }
            None => {
                overlay::draw_detections(&mut frame, &faces);
                (FrameMode::Detecting, Vec::new())
            }
        };
        Ok(FrameReport {
            frame,
            faces,
            mode,
            capture: CaptureOutcome::NotRegistering,
            recognitions,
        })
    }

    /// Aborts an active registration, e.g. after a failed sample write or
    /// when capture ends.
    pub fn cancel_registration(&self) -> Option<(PersonName, usize)> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel()
    }

    pub fn into_detector(self) -> Box<dyn FaceDetector> {
        self.detector
    }
}
