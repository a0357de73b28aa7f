pub mod config;
pub mod constants;
pub mod face_image;
pub mod frame;
pub mod person_name;
pub mod region;
