use std::path::{Path, PathBuf};

use super::error::CaptureError;
use super::format::AudioFormatSpec;
use crate::processing::loudness::LastByteEstimator;
use crate::traits::estimator::LoudnessEstimator;

/// Name of the shared temporary raw store.
pub const DEFAULT_TEMP_FILE_NAME: &str = "record_temp.raw";

/// Configuration for a capture session.
#[derive(Clone)]
pub struct CaptureConfiguration {
    /// Stream format used for capture and for the WAV header (default: 8 kHz mono 16-bit).
    pub format: AudioFormatSpec,

    /// Directory holding the WAV files, sidecars and the temporary raw store.
    pub output_directory: PathBuf,

    /// File name of the temporary raw store inside `output_directory`.
    pub temp_file_name: String,

    /// Consecutive device read errors tolerated before the capture loop gives up.
    /// `None` keeps reading indefinitely.
    pub max_consecutive_read_errors: Option<u32>,

    /// Write a `.metadata.json` sidecar next to each WAV (default: true).
    pub write_metadata: bool,

    /// Per-frame decibel proxy.
    pub estimator: Box<dyn LoudnessEstimator>,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.format
            .validate()
            .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?;
        if self.format.bits_per_sample() != 16 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported bit depth: {}",
                self.format.bits_per_sample()
            )));
        }
        if ![1, 2].contains(&self.format.channels()) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported channel count: {}",
                self.format.channels()
            )));
        }
        if self.temp_file_name.is_empty() {
            return Err(CaptureError::ConfigurationFailed("temp file name is empty".into()));
        }
        if Path::new(&self.temp_file_name).file_name().and_then(|n| n.to_str()) != Some(self.temp_file_name.as_str()) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "temp file name must be a bare file name: {}",
                self.temp_file_name
            )));
        }
        if self.max_consecutive_read_errors == Some(0) {
            return Err(CaptureError::ConfigurationFailed(
                "max consecutive read errors must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Full path of the temporary raw store.
    pub fn temp_file_path(&self) -> PathBuf {
        self.output_directory.join(&self.temp_file_name)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            format: AudioFormatSpec::default(),
            output_directory: PathBuf::from("."),
            temp_file_name: DEFAULT_TEMP_FILE_NAME.to_string(),
            max_consecutive_read_errors: None,
            write_metadata: true,
            estimator: Box::new(LastByteEstimator),
        }
    }
}
