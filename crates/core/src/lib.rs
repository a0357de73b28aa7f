//! Face registration, LBPH training and live recognition.
//!
//! Frames flow from a [`capture`] source through the [`detection`] adapter
//! into either the [`registration`] workflow or the [`recognition`]
//! classifier. [`session::face_session::FaceSession`] ties these together
//! for a UI shell.

pub mod capture;
pub mod detection;
pub mod pipeline;
pub mod recognition;
pub mod registration;
pub mod session;
pub mod shared;
