use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::capture::domain::frame_source::FrameSource;
use crate::pipeline::process_frame_use_case::{FrameError, FrameReport, ProcessFrameUseCase};
use crate::registration::domain::registration_session::CaptureOutcome;
use crate::session::session_event::SessionEvent;

/// Consecutive read failures tolerated before the loop gives up.
pub const MAX_READ_FAILURES: usize = 50;

pub struct CaptureParams {
    pub source: Box<dyn FrameSource>,
    pub processor: ProcessFrameUseCase,
    pub frame_interval: Duration,
    pub emit_frames: bool,
}

/// Handle to a running capture thread.
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<ProcessFrameUseCase>,
}

impl CaptureWorker {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals the loop, waits for it and takes the processor back.
    /// `None` if the thread panicked.
    pub fn stop(self) -> Option<ProcessFrameUseCase> {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.join() {
            Ok(processor) => Some(processor),
            Err(_) => {
                log::error!("Capture thread panicked");
                None
            }
        }
    }
}

/// The source must already be open.
pub fn spawn(params: CaptureParams, tx: Sender<SessionEvent>) -> CaptureWorker {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    let handle = thread::spawn(move || run_capture(params, &stop_clone, &tx));
    CaptureWorker { stop, handle }
}

fn run_capture(
    params: CaptureParams,
    stop: &AtomicBool,
    tx: &Sender<SessionEvent>,
) -> ProcessFrameUseCase {
    let CaptureParams {
        mut source,
        mut processor,
        frame_interval,
        emit_frames,
    } = params;
    let mut failures = 0;
    let mut processed = 0usize;

    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        match source.read_frame() {
            Ok(Some(frame)) => {
                failures = 0;
                processed += 1;
                match processor.execute(frame, Instant::now()) {
                    Ok(report) => emit_report(report, emit_frames, tx),
                    Err(e) => report_frame_error(e, &processor, tx),
                }
            }
            Ok(None) => {
                log::info!("Source exhausted after {processed} frames");
                let _ = tx.send(SessionEvent::Log("Source ended".into()));
                break;
            }
            Err(e) => {
                failures += 1;
                log::warn!("Frame read failed ({failures}/{MAX_READ_FAILURES}): {e}");
                if failures >= MAX_READ_FAILURES {
                    let _ = tx.send(SessionEvent::Error(format!("Camera read failed: {e}")));
                    break;
                }
            }
        }
        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    source.close();
    if let Some((name, samples)) = processor.cancel_registration() {
        let _ = tx.send(SessionEvent::RegistrationCancelled { name, samples });
    }
    log::info!("Capture stopped");
    let _ = tx.send(SessionEvent::CameraStopped);
    processor
}

fn emit_report(report: FrameReport, emit_frames: bool, tx: &Sender<SessionEvent>) {
    match report.capture {
        CaptureOutcome::Captured {
            name,
            captured,
            target,
        } => {
            let _ = tx.send(SessionEvent::RegistrationProgress {
                name,
                captured,
                target,
            });
        }
        CaptureOutcome::Completed { name, captured } => {
            let _ = tx.send(SessionEvent::RegistrationProgress {
                name: name.clone(),
                captured,
                target: captured,
            });
            let _ = tx.send(SessionEvent::Log(format!(
                "Registration complete for {name}: {captured} samples saved"
            )));
            let _ = tx.send(SessionEvent::RegistrationComplete {
                name,
                samples: captured,
            });
        }
        _ => {}
    }
    if !report.recognitions.is_empty() {
        let _ = tx.send(SessionEvent::Recognized(report.recognitions));
    }
    if emit_frames {
        let _ = tx.send(SessionEvent::Frame(report.frame));
    }
}

fn report_frame_error(
    error: FrameError,
    processor: &ProcessFrameUseCase,
    tx: &Sender<SessionEvent>,
) {
    log::warn!("Frame processing failed: {error}");
    let _ = tx.send(SessionEvent::Error(error.to_string()));
    // A failed sample write ends the registration.
    if matches!(error, FrameError::Registration(_)) {
        if let Some((name, samples)) = processor.cancel_registration() {
            let _ = tx.send(SessionEvent::RegistrationCancelled { name, samples });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::frame_source::SourceInfo;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::recognition::domain::face_recognizer::FaceRecognizer;
    use crate::recognition::domain::model_slot::ModelSlot;
    use crate::registration::domain::registration_session::RegistrationSession;
    use crate::registration::domain::sample_store::{SampleStore, StoreError, StoredSample};
    use crate::shared::config::RegistrationConfig;
    use crate::shared::frame::Frame;
    use crate::shared::person_name::PersonName;
    use crate::shared::region::Region;
    use crossbeam_channel::Receiver;
    use image::GrayImage;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    // --- Stubs ---

    enum Step {
        Frame,
        Fail,
    }

    /// Plays `script`, then either ends or keeps yielding frames.
    struct ScriptedSource {
        script: VecDeque<Step>,
        endless: bool,
        reads: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = Step>, endless: bool) -> Self {
            Self {
                script: script.into_iter().collect(),
                endless,
                reads: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
            unimplemented!()
        }

        fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            let index = self.reads.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(Step::Frame) => Ok(Some(frame(index))),
                Some(Step::Fail) => Err("device busy".into()),
                None if self.endless => Ok(Some(frame(index))),
                None => Ok(None),
            }
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct OneFaceDetector;

    impl FaceDetector for OneFaceDetector {
        fn detect(&mut self, _gray: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(vec![Region::new(20, 20, 40, 40)])
        }
    }

    /// Refuses every sample write.
    struct FullDiskStore;

    impl SampleStore for FullDiskStore {
        fn persons(&self) -> Result<Vec<PersonName>, StoreError> {
            Ok(Vec::new())
        }

        fn exists(&self, _person: &PersonName) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn add_sample(
            &self,
            _person: &PersonName,
            index: usize,
            _face: &GrayImage,
        ) -> Result<StoredSample, StoreError> {
            Err(StoreError::Encode {
                path: PathBuf::from(format!("face_{index:03}.png")),
                message: "disk full".into(),
            })
        }

        fn samples(&self, _person: &PersonName) -> Result<Vec<StoredSample>, StoreError> {
            Ok(Vec::new())
        }

        fn load_sample(&self, _sample: &StoredSample) -> Result<GrayImage, StoreError> {
            unimplemented!()
        }

        fn delete_person(&self, _person: &PersonName) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn clear(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    // --- Helpers ---

    fn frame(index: usize) -> Frame {
        let (w, h) = (120u32, 90u32);
        let data = (0..w * h)
            .flat_map(|i| {
                let v = (i % 251) as u8;
                [v, v, v]
            })
            .collect();
        Frame::new(data, w, h, 3, index)
    }

    fn registration() -> Arc<Mutex<RegistrationSession>> {
        Arc::new(Mutex::new(RegistrationSession::new(&RegistrationConfig {
            target_samples: 3,
            capture_delay_ms: 0,
            face_size: 24,
        })))
    }

    fn params(
        source: ScriptedSource,
        registration: Arc<Mutex<RegistrationSession>>,
    ) -> CaptureParams {
        CaptureParams {
            source: Box::new(source),
            processor: ProcessFrameUseCase::new(
                Box::new(OneFaceDetector),
                registration,
                Arc::new(FullDiskStore),
                FaceRecognizer::new(ModelSlot::new(), 50.0, 24),
                false,
            ),
            frame_interval: Duration::ZERO,
            emit_frames: false,
        }
    }

    /// Events up to and including `CameraStopped`.
    fn until_stopped(rx: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            let event = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            let stopped = matches!(event, SessionEvent::CameraStopped);
            events.push(event);
            if stopped {
                return events;
            }
        }
    }

    fn errors(events: &[SessionEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Error(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }

    fn fails(n: usize) -> impl Iterator<Item = Step> {
        (0..n).map(|_| Step::Fail)
    }

    // --- Tests ---

    #[test]
    fn test_gives_up_after_consecutive_read_failures() {
        let source = ScriptedSource::new(fails(MAX_READ_FAILURES + 10), false);
        let (reads, closed) = (source.reads.clone(), source.closed.clone());
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = spawn(params(source, registration()), tx);

        let events = until_stopped(&rx);
        assert_eq!(reads.load(Ordering::SeqCst), MAX_READ_FAILURES);
        assert_eq!(errors(&events), vec!["Camera read failed: device busy"]);
        let n = events.len();
        assert!(matches!(events[n - 2], SessionEvent::Error(_)));
        assert!(matches!(events[n - 1], SessionEvent::CameraStopped));
        assert!(closed.load(Ordering::SeqCst));
        assert!(worker.stop().is_some());
    }

    #[test]
    fn test_successful_read_resets_failure_count() {
        let script = fails(MAX_READ_FAILURES - 1)
            .chain([Step::Frame])
            .chain(fails(MAX_READ_FAILURES - 1));
        let source = ScriptedSource::new(script, false);
        let reads = source.reads.clone();
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = spawn(params(source, registration()), tx);

        let events = until_stopped(&rx);
        assert!(errors(&events).is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Log(m) if m == "Source ended")));
        // Both failure runs plus the frame and the final end-of-source read.
        assert_eq!(reads.load(Ordering::SeqCst), 2 * (MAX_READ_FAILURES - 1) + 2);
        assert!(worker.stop().is_some());
    }

    #[test]
    fn test_interleaved_failures_still_give_up() {
        let script = fails(MAX_READ_FAILURES - 1)
            .chain([Step::Frame])
            .chain(fails(MAX_READ_FAILURES + 5));
        let source = ScriptedSource::new(script, false);
        let reads = source.reads.clone();
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = spawn(params(source, registration()), tx);

        let events = until_stopped(&rx);
        assert_eq!(errors(&events).len(), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 2 * MAX_READ_FAILURES);
        assert!(worker.stop().is_some());
    }

    #[test]
    fn test_failed_sample_write_cancels_registration_but_keeps_camera() {
        let registration = registration();
        registration
            .lock()
            .unwrap()
            .begin("alice", false, &FullDiskStore)
            .unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = spawn(params(ScriptedSource::new([], true), registration.clone()), tx);

        let first = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(first, SessionEvent::Error(ref m) if m.contains("disk full")));
        let second = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(
            second,
            SessionEvent::RegistrationCancelled { ref name, samples: 0 } if name.as_str() == "alice"
        ));
        assert!(registration.lock().unwrap().is_idle());

        // Frames keep flowing after the cancellation.
        std::thread::sleep(Duration::from_millis(50));
        assert!(worker.is_running());
        assert!(worker.stop().is_some());

        let rest = until_stopped(&rx);
        assert!(!rest
            .iter()
            .any(|e| matches!(e, SessionEvent::RegistrationCancelled { .. })));
        assert!(errors(&rest).is_empty());
    }

    #[test]
    fn test_stop_cancels_active_registration() {
        let registration = registration();
        registration
            .lock()
            .unwrap()
            .begin("bob", false, &FullDiskStore)
            .unwrap();
        // Only read failures, so the registration never sees a frame.
        let source = ScriptedSource::new(fails(MAX_READ_FAILURES), false);
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = spawn(params(source, registration.clone()), tx);

        let events = until_stopped(&rx);
        let n = events.len();
        assert!(matches!(
            events[n - 2],
            SessionEvent::RegistrationCancelled { ref name, samples: 0 } if name.as_str() == "bob"
        ));
        assert!(registration.lock().unwrap().is_idle());
        assert!(worker.stop().is_some());
    }
}
