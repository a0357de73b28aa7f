pub const DETECTOR_MODEL_NAME: &str = "seeta_fd_frontal_v1.0.bin";
pub const DETECTOR_MODEL_URL: &str =
    "https://github.com/atomashpolskiy/rustface/raw/master/model/seeta_fd_frontal_v1.0.bin";

/// Extensions accepted when loading stored face samples.
pub const SAMPLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Extensions accepted for image-sequence sources and `detect`.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const SAMPLE_FILE_PREFIX: &str = "face_";

/// Persisted classifier + label map, stored in the data root.
pub const MODEL_FILE_NAME: &str = "model.json";

pub const UNKNOWN_LABEL: &str = "Unknown";

pub const APP_DIR_NAME: &str = "facereg";
