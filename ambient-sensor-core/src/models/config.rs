use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SensorError;

/// Configuration for one capture session.
///
/// Field names serialize in camelCase so host applications can pass the same
/// option keys they use elsewhere (`autoFileTransferInterval`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorConfig {
    /// Log decibel rows to rotating CSV segments (default: true).
    pub activate_ambient_noise_sensor: bool,

    /// Record the first input channel to rotating WAV segments (default: false).
    pub activate_raw_audio_sensor: bool,

    /// Rotation period in seconds; also the raw audio segment length (default: 60).
    pub auto_file_transfer_interval: u64,

    /// Verbose tracing only, no behavioral change (default: false).
    pub debug: bool,

    /// Directory where segment files are created.
    pub output_directory: PathBuf,
}

impl SensorConfig {
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.auto_file_transfer_interval == 0 {
            return Err(SensorError::InvalidConfiguration(
                "autoFileTransferInterval must be positive".into(),
            ));
        }
        if !self.activate_ambient_noise_sensor && !self.activate_raw_audio_sensor {
            return Err(SensorError::InvalidConfiguration(
                "no sensor activated".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, SensorError> {
        let config: SensorConfig = serde_json::from_str(json)
            .map_err(|e| SensorError::InvalidConfiguration(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.auto_file_transfer_interval)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            activate_ambient_noise_sensor: true,
            activate_raw_audio_sensor: false,
            auto_file_transfer_interval: 60,
            debug: false,
            output_directory: PathBuf::from("."),
        }
    }
}
