use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::pipeline::train_model_use_case::TrainModelUseCase;
use crate::session::session_event::SessionEvent;

/// Clears the in-progress flag however the training thread exits.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one training pass on its own thread. `busy` must already be set by
/// the caller; it is cleared when the thread ends.
pub fn spawn(
    use_case: TrainModelUseCase,
    busy: Arc<AtomicBool>,
    tx: Sender<SessionEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let _guard = BusyGuard(busy);
        let _ = tx.send(SessionEvent::TrainingStarted);
        match use_case.execute() {
            Ok(outcome) => {
                let _ = tx.send(SessionEvent::TrainingFinished(outcome));
            }
            Err(e) => {
                log::error!("Training failed: {e}");
                let _ = tx.send(SessionEvent::TrainingFailed(e.to_string()));
            }
        }
    })
}
