use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::detector_params::DetectorParams;
use crate::recognition::infrastructure::lbph::LbphParams;

/// Canonical face crop side length in pixels.
pub const DEFAULT_FACE_SIZE: u32 = 200;

/// Smallest accepted face crop side length.
pub const MIN_FACE_SIZE: u32 = 16;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("face_size must be at least {MIN_FACE_SIZE}, got {0}")]
    FaceSize(u32),
    #[error("face_size {face_size} is too small for a {grid}-cell LBPH grid at radius {radius}")]
    FaceSizeForGrid { face_size: u32, radius: u32, grid: u32 },
    #[error("target_samples must be at least 1")]
    TargetSamples,
    #[error("recognition threshold must be positive, got {0}")]
    Threshold(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub target_samples: usize,
    pub capture_delay_ms: u64,
    pub face_size: u32,
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.face_size < MIN_FACE_SIZE {
            return Err(ConfigError::FaceSize(self.face_size));
        }
        if self.target_samples == 0 {
            return Err(ConfigError::TargetSamples);
        }
        Ok(())
    }

    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.capture_delay_ms)
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            target_samples: 50,
            capture_delay_ms: 100,
            face_size: DEFAULT_FACE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Faces with an LBPH distance at or above this are reported Unknown.
    pub threshold: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self { threshold: 50.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub frame_interval_ms: u64,
    pub mirror: bool,
    /// Requested camera resolution; 0 leaves it to the driver.
    pub width: u32,
    pub height: u32,
    /// Replay image directories forever instead of stopping at the end.
    pub loop_images: bool,
}

impl CaptureConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 10,
            mirror: true,
            width: 640,
            height: 480,
            loop_images: false,
        }
    }
}

/// Everything the session needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub registration: RegistrationConfig,
    pub recognition: RecognitionConfig,
    pub lbph: LbphParams,
    pub detector: DetectorParams,
    pub capture: CaptureConfig,
    pub persist_model: bool,
    pub sample_extension: String,
}

impl SessionConfig {
    /// Checks the settings that would otherwise only fail once frames or
    /// samples reach them. LBPH parameters are checked by `lbph::load_trainer`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registration.validate()?;
        // Every grid cell needs at least one pixel once the LBP radius is cropped off.
        let grid = self.lbph.grid_x.max(self.lbph.grid_y);
        let needed = self.lbph.radius.saturating_mul(2).saturating_add(grid);
        if self.registration.face_size < needed {
            return Err(ConfigError::FaceSizeForGrid {
                face_size: self.registration.face_size,
                radius: self.lbph.radius,
                grid,
            });
        }
        let threshold = self.recognition.threshold;
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(ConfigError::Threshold(threshold));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            registration: RegistrationConfig::default(),
            recognition: RecognitionConfig::default(),
            lbph: LbphParams::default(),
            detector: DetectorParams::default(),
            capture: CaptureConfig::default(),
            persist_model: true,
            sample_extension: "png".to_string(),
        }
    }
}
