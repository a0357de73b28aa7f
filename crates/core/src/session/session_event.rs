use crate::capture::domain::frame_source::SourceInfo;
use crate::pipeline::train_model_use_case::TrainingOutcome;
use crate::recognition::domain::identity::Recognition;
use crate::shared::frame::Frame;
use crate::shared::person_name::PersonName;

/// Notifications delivered to the UI thread.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Human-readable status line.
    Log(String),
    CameraStarted(SourceInfo),
    CameraStopped,
    Error(String),
    /// Annotated frame; only sent when frame events are enabled.
    Frame(Frame),
    RegistrationStarted {
        name: PersonName,
        target: usize,
    },
    RegistrationProgress {
        name: PersonName,
        captured: usize,
        target: usize,
    },
    RegistrationComplete {
        name: PersonName,
        samples: usize,
    },
    RegistrationCancelled {
        name: PersonName,
        samples: usize,
    },
    Recognized(Vec<Recognition>),
    TrainingStarted,
    TrainingFinished(TrainingOutcome),
    TrainingFailed(String),
    PersonDeleted(PersonName),
    ProfilesCleared,
}
