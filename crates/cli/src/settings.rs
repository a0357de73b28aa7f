use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use facereg_core::shared::config::SessionConfig;
use facereg_core::shared::constants::APP_DIR_NAME;

const SETTINGS_FILE_NAME: &str = "settings.json";
const DATABASE_DIR_NAME: &str = "face_database";

/// User settings, stored as JSON in the platform config directory.
/// Command line flags override the corresponding fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the face database; defaults to the user data directory.
    pub data_dir: Option<PathBuf>,
    /// Explicit detector model file. Never downloaded over.
    pub detector_model: Option<PathBuf>,
    /// Directory searched for a pre-installed detector model.
    pub models_dir: Option<PathBuf>,
    pub session: SessionConfig,
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Reads settings from `path`. A missing or unreadable file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Cannot read {}: {e}; using defaults", path.display());
                return Self::default();
            }
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            log::warn!("Ignoring corrupt settings in {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_default()
        .join(DATABASE_DIR_NAME)
}
