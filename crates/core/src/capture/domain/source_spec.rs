use std::path::PathBuf;

/// Prefix selecting a camera device, e.g. `camera:0` or `camera:/dev/video2`.
pub const CAMERA_PREFIX: &str = "camera:";

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Camera index or platform device name.
    Camera(String),
    /// Directory of still images replayed in file name order.
    ImageDirectory(PathBuf),
    /// Any video file ffmpeg can decode.
    VideoFile(PathBuf),
}

impl SourceSpec {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty source".into());
        }
        if let Some(device) = raw.strip_prefix(CAMERA_PREFIX) {
            if device.is_empty() {
                return Err("camera source needs an index or device name".into());
            }
            return Ok(SourceSpec::Camera(device.to_string()));
        }
        let path = PathBuf::from(raw);
        if path.is_dir() {
            Ok(SourceSpec::ImageDirectory(path))
        } else if path.is_file() {
            Ok(SourceSpec::VideoFile(path))
        } else {
            Err(format!("source not found: {raw}"))
        }
    }
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::Camera("0".into())
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Camera(device) => write!(f, "{CAMERA_PREFIX}{device}"),
            SourceSpec::ImageDirectory(p) | SourceSpec::VideoFile(p) => {
                write!(f, "{}", p.display())
            }
        }
    }
}
