use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::capture::domain::frame_source::{FrameSource, SourceInfo};
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::process_frame_use_case::ProcessFrameUseCase;
use crate::pipeline::train_model_use_case::{TrainModelUseCase, TrainingError, TrainingOutcome};
use crate::recognition::domain::face_classifier::ClassifierTrainer;
use crate::recognition::domain::face_recognizer::FaceRecognizer;
use crate::recognition::domain::model_slot::ModelSlot;
use crate::recognition::infrastructure::model_file::{ModelFile, ModelFileError};
use crate::registration::domain::registration_session::{
    RegistrationError, RegistrationProgress, RegistrationSession, RegistrationState,
};
use crate::registration::domain::sample_store::{SampleStore, StoreError};
use crate::session::capture_worker::{self, CaptureParams, CaptureWorker};
use crate::session::session_event::SessionEvent;
use crate::session::training_worker;
use crate::shared::config::{ConfigError, SessionConfig};
use crate::shared::person_name::{NameError, PersonName};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera is already running")]
    CameraActive,
    #[error("camera is not running")]
    CameraInactive,
    #[error("no face detector is available")]
    NoDetector,
    #[error("failed to open source: {0}")]
    Source(String),
    #[error("cannot {0} while a registration is in progress")]
    RegistrationActive(&'static str),
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ModelFile(#[from] ModelFileError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionStats {
    pub persons: usize,
    pub samples: usize,
    pub trained_labels: usize,
    pub threshold: f64,
    pub model_ready: bool,
    pub recognition_available: bool,
    pub camera_active: bool,
    pub registering: Option<PersonName>,
}

/// Application controller driven by the UI shell.
///
/// Owns the capture and training workers, the registration state machine
/// and the model slot. Every outcome that happens off the calling thread
/// is reported through [`FaceSession::events`].
pub struct FaceSession {
    config: SessionConfig,
    store: Arc<dyn SampleStore>,
    trainer: Option<Arc<dyn ClassifierTrainer>>,
    model_path: Option<PathBuf>,
    slot: ModelSlot,
    registration: Arc<Mutex<RegistrationSession>>,
    detector: Option<Box<dyn FaceDetector>>,
    capture: Option<CaptureWorker>,
    training_busy: Arc<AtomicBool>,
    training: Option<JoinHandle<()>>,
    emit_frames: bool,
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
}

impl FaceSession {
    /// `trainer` comes from `lbph::load_trainer`; `None` disables training
    /// and recognition. Fails on a config that could not produce usable
    /// face crops.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SampleStore>,
        trainer: Option<Arc<dyn ClassifierTrainer>>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let registration = Arc::new(Mutex::new(RegistrationSession::new(&config.registration)));
        Ok(Self {
            config,
            store,
            trainer,
            model_path: None,
            slot: ModelSlot::new(),
            registration,
            detector: None,
            capture: None,
            training_busy: Arc::new(AtomicBool::new(false)),
            training: None,
            emit_frames: false,
            tx,
            rx,
        })
    }

    /// Required before the camera can start.
    pub fn with_detector(mut self, detector: Box<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Where the trained model is saved, when persistence is enabled.
    pub fn with_model_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Send annotated frames as [`SessionEvent::Frame`].
    pub fn with_frame_events(mut self, enabled: bool) -> Self {
        self.emit_frames = enabled;
        self
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.rx.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn model_slot(&self) -> &ModelSlot {
        &self.slot
    }

    pub fn recognition_available(&self) -> bool {
        self.trainer.is_some()
    }

    fn model_file(&self) -> Option<ModelFile> {
        if !self.config.persist_model {
            return None;
        }
        self.model_path.as_ref().map(ModelFile::new)
    }

    fn registration(&self) -> MutexGuard<'_, RegistrationSession> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, message: impl Into<String>) {
        let _ = self.tx.send(SessionEvent::Log(message.into()));
    }

    /// Loads a previously saved model into the slot. Returns whether one
    /// was loaded.
    pub fn load_model(&self) -> Result<bool, SessionError> {
        let (Some(trainer), Some(file)) = (&self.trainer, self.model_file()) else {
            return Ok(false);
        };
        match file.load(trainer.as_ref())? {
            Some(model) => {
                let labels = model.labels.len();
                self.slot.publish(model);
                log::info!("Loaded model with {labels} persons from {}", file.path().display());
                self.log(format!("Loaded trained model ({labels} persons)"));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Camera ---

    pub fn is_camera_active(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_running())
    }

    /// Opens `source` and starts the capture thread.
    pub fn start_camera(
        &mut self,
        mut source: Box<dyn FrameSource>,
    ) -> Result<SourceInfo, SessionError> {
        self.reap_capture();
        if self.capture.is_some() {
            return Err(SessionError::CameraActive);
        }
        let detector = self.detector.take().ok_or(SessionError::NoDetector)?;
        let info = match source.open() {
            Ok(info) => info,
            Err(e) => {
                self.detector = Some(detector);
                return Err(SessionError::Source(e.to_string()));
            }
        };

        let recognizer = FaceRecognizer::new(
            self.slot.clone(),
            self.config.recognition.threshold,
            self.config.registration.face_size,
        );
        let processor = ProcessFrameUseCase::new(
            detector,
            self.registration.clone(),
            self.store.clone(),
            recognizer,
            self.config.capture.mirror,
        );
        self.capture = Some(capture_worker::spawn(
            CaptureParams {
                source,
                processor,
                frame_interval: self.config.capture.frame_interval(),
                emit_frames: self.emit_frames,
            },
            self.tx.clone(),
        ));
        log::info!("Camera started: {}", info.description);
        let _ = self.tx.send(SessionEvent::CameraStarted(info.clone()));
        Ok(info)
    }

    /// Stops capture and releases the source. Returns whether a capture
    /// thread was running.
    pub fn stop_camera(&mut self) -> bool {
        let Some(worker) = self.capture.take() else {
            return false;
        };
        let was_running = worker.is_running();
        self.detector = worker.stop().map(ProcessFrameUseCase::into_detector);
        was_running
    }

    /// Joins a capture thread that ended by itself and takes the detector back.
    fn reap_capture(&mut self) {
        if self.capture.as_ref().is_some_and(|c| !c.is_running()) {
            self.stop_camera();
        }
    }

    // --- Registration ---

    pub fn begin_registration(
        &mut self,
        name: &str,
        overwrite: bool,
    ) -> Result<PersonName, SessionError> {
        let name = PersonName::parse(name)?;
        if !self.is_camera_active() {
            return Err(SessionError::CameraInactive);
        }
        let (name, target) = {
            let mut registration = self.registration();
            let name = registration.begin(name.as_str(), overwrite, self.store.as_ref())?;
            (name, registration.target())
        };
        self.log(format!("Registering {name}: look at the camera"));
        let _ = self.tx.send(SessionEvent::RegistrationStarted {
            name: name.clone(),
            target,
        });
        Ok(name)
    }

    pub fn cancel_registration(&self) -> Option<(PersonName, usize)> {
        let cancelled = self.registration().cancel();
        if let Some((name, samples)) = &cancelled {
            let _ = self.tx.send(SessionEvent::RegistrationCancelled {
                name: name.clone(),
                samples: *samples,
            });
        }
        cancelled
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.registration().state().clone()
    }

    pub fn registration_progress(&self) -> RegistrationProgress {
        self.registration().progress()
    }

    // --- Training ---

    pub fn is_training(&self) -> bool {
        self.training_busy.load(Ordering::SeqCst)
    }

    /// Starts a training run in the background. The result arrives as
    /// [`SessionEvent::TrainingFinished`] or [`SessionEvent::TrainingFailed`].
    pub fn train(&mut self) -> Result<(), SessionError> {
        let Some(trainer) = self.trainer.clone() else {
            log::warn!("Training requested but the classifier is unavailable");
            let _ = self
                .tx
                .send(SessionEvent::TrainingFinished(TrainingOutcome::Unavailable));
            return Ok(());
        };
        if self
            .training_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TrainingError::Busy.into());
        }
        if let Some(previous) = self.training.take() {
            let _ = previous.join();
        }

        let use_case = TrainModelUseCase::new(
            self.store.clone(),
            trainer,
            self.slot.clone(),
            self.model_file(),
            self.config.registration.face_size,
        );
        self.training = Some(training_worker::spawn(
            use_case,
            self.training_busy.clone(),
            self.tx.clone(),
        ));
        Ok(())
    }

    /// Blocks until the current training run, if any, has finished.
    pub fn wait_for_training(&mut self) {
        if let Some(handle) = self.training.take() {
            if handle.join().is_err() {
                log::error!("Training thread panicked");
            }
        }
    }

    // --- Person management ---

    /// Registered persons with their sample counts.
    pub fn persons(&self) -> Result<Vec<(PersonName, usize)>, SessionError> {
        let mut out = Vec::new();
        for person in self.store.persons()? {
            let count = self.store.sample_count(&person)?;
            out.push((person, count));
        }
        Ok(out)
    }

    /// Deletes a person's samples. A loaded model that knows the person is
    /// discarded, so recognition stays off until the next training run.
    pub fn delete_person(&mut self, name: &str) -> Result<bool, SessionError> {
        let name = PersonName::parse(name)?;
        if self.registration().active_name() == Some(&name) {
            return Err(SessionError::RegistrationActive("delete the person being registered"));
        }
        if self.is_training() {
            return Err(TrainingError::Busy.into());
        }
        if !self.store.delete_person(&name)? {
            return Ok(false);
        }

        let stale = self
            .slot
            .snapshot()
            .is_some_and(|m| m.labels.label(&name).is_some());
        if stale {
            self.slot.clear();
            if let Some(file) = self.model_file() {
                file.remove()?;
            }
            self.log("Model discarded; train again to recognise the remaining persons");
        }
        self.log(format!("Deleted {name}"));
        let _ = self.tx.send(SessionEvent::PersonDeleted(name));
        Ok(true)
    }

    /// Removes every person, the saved model and the loaded model.
    pub fn clear(&mut self) -> Result<usize, SessionError> {
        if !self.registration().is_idle() {
            return Err(SessionError::RegistrationActive("clear profiles"));
        }
        if self.is_training() {
            return Err(TrainingError::Busy.into());
        }
        let removed = self.store.clear()?;
        self.slot.clear();
        if let Some(file) = self.model_file() {
            file.remove()?;
        }
        log::info!("Cleared {removed} profiles");
        self.log(format!("All profiles cleared ({removed} removed)"));
        let _ = self.tx.send(SessionEvent::ProfilesCleared);
        Ok(removed)
    }

    pub fn stats(&self) -> Result<SessionStats, SessionError> {
        let persons = self.persons()?;
        let model = self.slot.snapshot();
        Ok(SessionStats {
            persons: persons.len(),
            samples: persons.iter().map(|(_, n)| n).sum(),
            trained_labels: model.as_ref().map_or(0, |m| m.labels.len()),
            threshold: self.config.recognition.threshold,
            model_ready: model.is_some(),
            recognition_available: self.trainer.is_some(),
            camera_active: self.is_camera_active(),
            registering: self.registration().active_name().cloned(),
        })
    }

    /// Stops the camera and waits for training to finish.
    pub fn shutdown(&mut self) {
        self.stop_camera();
        self.wait_for_training();
    }
}

impl Drop for FaceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
