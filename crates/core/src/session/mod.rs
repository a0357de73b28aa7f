pub mod capture_worker;
pub mod face_session;
pub mod session_event;
pub mod training_worker;
