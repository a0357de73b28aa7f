pub mod registration_session;
pub mod sample_store;
