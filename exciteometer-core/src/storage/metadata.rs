use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::format::AudioFormatSpec;
use crate::models::session::Session;

/// Sidecar describing one finalized session.
///
/// Serializable for JSON export alongside the WAV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub label: String,
    /// Mean decibel value; `None` when the session kept no samples.
    pub aggregate_loudness_db: Option<f64>,
    pub sample_count: usize,
    pub data_bytes: u32,
    pub file_path: String,
    pub checksum: String,
    pub estimator: String,
    pub created_at: String,
    pub format: AudioFormatSpec,
}

impl SessionMetadata {
    /// Describe a committed session whose WAV already exists on disk.
    pub fn for_session(
        session: &Session,
        format: AudioFormatSpec,
        sample_count: usize,
        data_bytes: u32,
        estimator: &str,
    ) -> Result<Self, CaptureError> {
        let path = session
            .output_file_path()
            .ok_or_else(|| CaptureError::IoError("session has no output file".into()))?;
        let aggregate = session.aggregate_loudness();

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: session.label().to_string(),
            aggregate_loudness_db: aggregate.is_finite().then_some(aggregate),
            sample_count,
            data_bytes,
            file_path: path.to_string_lossy().to_string(),
            checksum: sha256_file(path)?,
            estimator: estimator.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            format,
        })
    }
}

/// Write session metadata as a JSON sidecar file.
///
/// Creates `{recording_stem}.metadata.json` alongside the recording.
pub fn write_metadata(metadata: &SessionMetadata, recording_path: &Path) -> Result<(), CaptureError> {
    let metadata_path = recording_path.with_extension("metadata.json");
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::IoError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&metadata_path, json).map_err(|e| CaptureError::io("failed to write metadata", e))?;
    Ok(())
}

/// Read session metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<SessionMetadata, CaptureError> {
    let metadata_path = recording_path.with_extension("metadata.json");
    let json = fs::read_to_string(&metadata_path).map_err(|e| CaptureError::io("failed to read metadata", e))?;
    let metadata: SessionMetadata = serde_json::from_str(&json)
        .map_err(|e| CaptureError::IoError(format!("failed to parse metadata: {}", e)))?;
    Ok(metadata)
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path).map_err(|e| CaptureError::io("failed to read file for checksum", e))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
