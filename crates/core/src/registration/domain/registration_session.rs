use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::GrayImage;
use thiserror::Error;

use crate::registration::domain::sample_store::{SampleStore, StoreError};
use crate::shared::config::RegistrationConfig;
use crate::shared::face_image::crop_face;
use crate::shared::person_name::{NameError, PersonName};
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    #[error("registration of {0} is already in progress")]
    Busy(PersonName),
    #[error("{0} is already registered; confirm overwrite to replace the samples")]
    AlreadyExists(PersonName),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    Registering(PersonName),
    /// Target reached; waiting for [`RegistrationSession::finish`].
    Completing(PersonName),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoFace,
    MultipleFaces(usize),
    /// The face box does not overlap the frame.
    OutOfFrame,
}

/// What a single frame did to an active registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    NotRegistering,
    Skipped(SkipReason),
    Throttled,
    Captured {
        name: PersonName,
        captured: usize,
        target: usize,
    },
    Completed {
        name: PersonName,
        captured: usize,
    },
}

/// Read-only view of the capture counter, shareable with other threads.
#[derive(Clone, Debug, Default)]
pub struct RegistrationProgress(Arc<AtomicUsize>);

impl RegistrationProgress {
    pub fn captured(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collects face samples for one person at a time.
///
/// `Idle -> Registering -> Completing -> Idle`. Only one registration can
/// be active; `begin` is rejected until the previous one is finished or
/// cancelled.
pub struct RegistrationSession {
    state: RegistrationState,
    target: usize,
    capture_delay: Duration,
    face_size: u32,
    captured: Arc<AtomicUsize>,
    last_capture: Option<Instant>,
}

impl RegistrationSession {
    pub fn new(config: &RegistrationConfig) -> Self {
        Self {
            state: RegistrationState::Idle,
            target: config.target_samples.max(1),
            capture_delay: config.capture_delay(),
            face_size: config.face_size,
            captured: Arc::new(AtomicUsize::new(0)),
            last_capture: None,
        }
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RegistrationState::Idle
    }

    pub fn is_registering(&self) -> bool {
        matches!(self.state, RegistrationState::Registering(_))
    }

    /// Name of the person being registered or completed.
    pub fn active_name(&self) -> Option<&PersonName> {
        match &self.state {
            RegistrationState::Idle => None,
            RegistrationState::Registering(n) | RegistrationState::Completing(n) => Some(n),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn progress(&self) -> RegistrationProgress {
        RegistrationProgress(self.captured.clone())
    }

    pub fn begin(
        &mut self,
        raw_name: &str,
        overwrite: bool,
        store: &dyn SampleStore,
    ) -> Result<PersonName, RegistrationError> {
        let name = PersonName::parse(raw_name)?;
        if let Some(active) = self.active_name() {
            return Err(RegistrationError::Busy(active.clone()));
        }
        if store.exists(&name)? {
            if !overwrite {
                return Err(RegistrationError::AlreadyExists(name));
            }
            store.delete_person(&name)?;
            log::info!("Deleted previous samples of {name}");
        }

        self.captured.store(0, Ordering::SeqCst);
        self.last_capture = None;
        self.state = RegistrationState::Registering(name.clone());
        log::info!("Registering {name}: collecting {} samples", self.target);
        Ok(name)
    }

    /// Feeds one preprocessed frame and its detections.
    pub fn process(
        &mut self,
        gray: &GrayImage,
        faces: &[Region],
        now: Instant,
        store: &dyn SampleStore,
    ) -> Result<CaptureOutcome, RegistrationError> {
        let RegistrationState::Registering(name) = &self.state else {
            return Ok(CaptureOutcome::NotRegistering);
        };
        let face = match faces {
            [face] => face,
            [] => return Ok(CaptureOutcome::Skipped(SkipReason::NoFace)),
            many => return Ok(CaptureOutcome::Skipped(SkipReason::MultipleFaces(many.len()))),
        };
        if let Some(last) = self.last_capture {
            if now.saturating_duration_since(last) < self.capture_delay {
                return Ok(CaptureOutcome::Throttled);
            }
        }
        let Some(crop) = crop_face(gray, face, self.face_size) else {
            return Ok(CaptureOutcome::Skipped(SkipReason::OutOfFrame));
        };

        let index = self.captured.load(Ordering::SeqCst);
        store.add_sample(name, index, &crop)?;
        self.last_capture = Some(now);
        let captured = self.captured.fetch_add(1, Ordering::SeqCst) + 1;
        let name = name.clone();

        if captured >= self.target {
            log::info!("Registration of {name} reached {captured} samples");
            self.state = RegistrationState::Completing(name.clone());
            Ok(CaptureOutcome::Completed { name, captured })
        } else {
            if captured % 10 == 0 {
                log::info!("Captured {captured}/{} samples of {name}", self.target);
            }
            Ok(CaptureOutcome::Captured {
                name,
                captured,
                target: self.target,
            })
        }
    }

    /// Seals a completed registration and returns to Idle.
    pub fn finish(&mut self) -> Option<PersonName> {
        let RegistrationState::Completing(name) = &self.state else {
            return None;
        };
        let name = name.clone();
        self.state = RegistrationState::Idle;
        self.last_capture = None;
        Some(name)
    }

    /// Aborts an active registration. Samples already written are kept.
    pub fn cancel(&mut self) -> Option<(PersonName, usize)> {
        let name = self.active_name()?.clone();
        let captured = self.captured.load(Ordering::SeqCst);
        self.state = RegistrationState::Idle;
        self.last_capture = None;
        log::info!("Registration of {name} cancelled after {captured} samples");
        Some((name, captured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::domain::sample_store::StoredSample;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubStore {
        people: Mutex<BTreeMap<PersonName, Vec<usize>>>,
    }

    impl StubStore {
        fn with(name: &str, samples: usize) -> Self {
            let store = Self::default();
            store
                .people
                .lock()
                .unwrap()
                .insert(PersonName::parse(name).unwrap(), (0..samples).collect());
            store
        }

        fn count(&self, name: &str) -> usize {
            let people = self.people.lock().unwrap();
            people
                .get(&PersonName::parse(name).unwrap())
                .map_or(0, |s| s.len())
        }
    }

    impl SampleStore for StubStore {
        fn persons(&self) -> Result<Vec<PersonName>, StoreError> {
            Ok(self.people.lock().unwrap().keys().cloned().collect())
        }

        fn exists(&self, person: &PersonName) -> Result<bool, StoreError> {
            Ok(self.people.lock().unwrap().contains_key(person))
        }

        fn add_sample(
            &self,
            person: &PersonName,
            index: usize,
            _face: &GrayImage,
        ) -> Result<StoredSample, StoreError> {
            self.people
                .lock()
                .unwrap()
                .entry(person.clone())
                .or_default()
                .push(index);
            Ok(StoredSample {
                person: person.clone(),
                index: Some(index),
                path: PathBuf::from(format!("face_{index:03}.png")),
            })
        }

        fn samples(&self, _person: &PersonName) -> Result<Vec<StoredSample>, StoreError> {
            Ok(Vec::new())
        }

        fn load_sample(&self, _sample: &StoredSample) -> Result<GrayImage, StoreError> {
            Ok(GrayImage::new(1, 1))
        }

        fn delete_person(&self, person: &PersonName) -> Result<bool, StoreError> {
            Ok(self.people.lock().unwrap().remove(person).is_some())
        }

        fn clear(&self) -> Result<usize, StoreError> {
            let mut people = self.people.lock().unwrap();
            let n = people.len();
            people.clear();
            Ok(n)
        }
    }

    fn config(target: usize) -> RegistrationConfig {
        RegistrationConfig {
            target_samples: target,
            capture_delay_ms: 100,
            face_size: 32,
        }
    }

    fn gray() -> GrayImage {
        GrayImage::from_fn(120, 120, |x, y| image::Luma([(x + y) as u8]))
    }

    fn one_face() -> Vec<Region> {
        vec![Region::new(20, 20, 60, 60)]
    }

    #[test]
    fn test_invalid_name_leaves_idle() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(5));
        let err = session.begin("bad name", false, &store).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidName(_)));
        assert!(session.is_idle());
    }

    #[test]
    fn test_existing_person_needs_overwrite() {
        let store = StubStore::with("alice", 3);
        let mut session = RegistrationSession::new(&config(5));

        let err = session.begin("alice", false, &store).unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyExists(_)));
        assert!(session.is_idle());
        assert_eq!(store.count("alice"), 3);

        session.begin("alice", true, &store).unwrap();
        assert!(session.is_registering());
        assert_eq!(store.count("alice"), 0);
    }

    #[test]
    fn test_second_begin_is_busy() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(5));
        session.begin("alice", false, &store).unwrap();
        let err = session.begin("bob", false, &store).unwrap_err();
        assert!(matches!(err, RegistrationError::Busy(ref n) if n.as_str() == "alice"));
    }

    #[test]
    fn test_face_count_must_be_exactly_one() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(5));
        session.begin("alice", false, &store).unwrap();
        let t0 = Instant::now();

        let out = session.process(&gray(), &[], t0, &store).unwrap();
        assert_eq!(out, CaptureOutcome::Skipped(SkipReason::NoFace));

        let two = vec![Region::new(0, 0, 30, 30), Region::new(50, 50, 30, 30)];
        let out = session.process(&gray(), &two, t0, &store).unwrap();
        assert_eq!(out, CaptureOutcome::Skipped(SkipReason::MultipleFaces(2)));

        assert_eq!(session.progress().captured(), 0);
        assert_eq!(store.count("alice"), 0);
    }

    #[test]
    fn test_captures_are_throttled() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(5));
        session.begin("alice", false, &store).unwrap();
        let t0 = Instant::now();

        let out = session.process(&gray(), &one_face(), t0, &store).unwrap();
        assert!(matches!(out, CaptureOutcome::Captured { captured: 1, target: 5, .. }));

        let soon = t0 + Duration::from_millis(50);
        let out = session.process(&gray(), &one_face(), soon, &store).unwrap();
        assert_eq!(out, CaptureOutcome::Throttled);

        let later = t0 + Duration::from_millis(100);
        let out = session.process(&gray(), &one_face(), later, &store).unwrap();
        assert!(matches!(out, CaptureOutcome::Captured { captured: 2, .. }));
        assert_eq!(store.count("alice"), 2);
    }

    #[test]
    fn test_reaching_target_completes() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(3));
        let progress = session.progress();
        session.begin("alice", false, &store).unwrap();
        let t0 = Instant::now();

        let mut last = CaptureOutcome::NotRegistering;
        for i in 0..3 {
            let now = t0 + Duration::from_millis(100 * i);
            last = session.process(&gray(), &one_face(), now, &store).unwrap();
        }
        assert!(matches!(last, CaptureOutcome::Completed { captured: 3, .. }));
        assert_eq!(progress.captured(), 3);
        assert!(matches!(session.state(), RegistrationState::Completing(_)));

        // No further captures while completing.
        let now = t0 + Duration::from_secs(5);
        let out = session.process(&gray(), &one_face(), now, &store).unwrap();
        assert_eq!(out, CaptureOutcome::NotRegistering);
        assert!(matches!(
            session.begin("bob", false, &store),
            Err(RegistrationError::Busy(_))
        ));

        assert_eq!(session.finish().unwrap().as_str(), "alice");
        assert!(session.is_idle());
        assert_eq!(store.count("alice"), 3);
    }

    #[test]
    fn test_out_of_frame_face_is_skipped() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(3));
        session.begin("alice", false, &store).unwrap();
        let off = vec![Region::new(500, 500, 40, 40)];
        let out = session.process(&gray(), &off, Instant::now(), &store).unwrap();
        assert_eq!(out, CaptureOutcome::Skipped(SkipReason::OutOfFrame));
    }

    #[test]
    fn test_cancel_keeps_samples() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(10));
        session.begin("alice", false, &store).unwrap();
        session
            .process(&gray(), &one_face(), Instant::now(), &store)
            .unwrap();

        let (name, captured) = session.cancel().unwrap();
        assert_eq!(name.as_str(), "alice");
        assert_eq!(captured, 1);
        assert!(session.is_idle());
        assert_eq!(store.count("alice"), 1);
        assert!(session.cancel().is_none());
    }

    #[test]
    fn test_finish_only_from_completing() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(10));
        assert!(session.finish().is_none());
        session.begin("alice", false, &store).unwrap();
        assert!(session.finish().is_none());
        assert!(session.is_registering());
    }

    #[test]
    fn test_restart_resets_counter() {
        let store = StubStore::default();
        let mut session = RegistrationSession::new(&config(1));
        session.begin("alice", false, &store).unwrap();
        session
            .process(&gray(), &one_face(), Instant::now(), &store)
            .unwrap();
        session.finish();

        session.begin("bob", false, &store).unwrap();
        assert_eq!(session.progress().captured(), 0);
    }
}
