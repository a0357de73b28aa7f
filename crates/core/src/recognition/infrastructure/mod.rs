pub mod lbph;
pub mod model_file;
#[cfg(feature = "opencv")]
pub mod opencv_lbph;
