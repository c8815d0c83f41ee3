use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::format::AudioFormatSpec;
use crate::processing::wav_format;

/// Append-only store for raw frames captured during a session.
///
/// Bytes are written verbatim in arrival order, with no framing. Once the
/// session stops, [`RawSampleSink::finalize`] turns the store into a WAV.
///
/// ## File Format
///
/// **Temporary store:**
/// ```text
/// [raw PCM bytes...]
/// ```
///
/// **Finalized WAV:**
/// ```text
/// [44-byte WAV header]
/// [raw PCM bytes copied from the temporary store]
/// ```
pub struct RawSampleSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl RawSampleSink {
    /// Create or truncate the temporary store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CaptureError::io("failed to create directory", e))?;
        }

        let file = File::create(&path).map_err(|e| CaptureError::io("failed to create temp store", e))?;

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    /// Append one frame's raw bytes.
    pub fn append(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::IoError("temp store is closed".into()))?;
        writer
            .write_all(frame)
            .map_err(|e| CaptureError::io("write failed", e))?;
        self.bytes_written += frame.len() as u64;
        Ok(())
    }

    /// Flush and release the file handle. Closing again is a no-op.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().map_err(|e| CaptureError::io("flush failed", e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| CaptureError::io("sync failed", e))?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Bytes appended so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the temporary store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Materialize `destination` as a WAV from the raw store at `source`,
    /// then delete the store.
    ///
    /// A missing or empty store still yields a valid WAV with zero data
    /// bytes. Returns the number of audio bytes written after the header.
    pub fn finalize(source: &Path, destination: &Path, format: &AudioFormatSpec) -> Result<u32, CaptureError> {
        let raw = match File::open(source) {
            Ok(mut file) => {
                let mut raw = Vec::new();
                file.read_to_end(&mut raw)
                    .map_err(|e| CaptureError::io("failed to read temp store", e))?;
                raw
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Temp store {} missing, writing empty WAV", source.display());
                Vec::new()
            }
            Err(e) => return Err(CaptureError::io("failed to open temp store", e)),
        };

        let header = wav_format::build_header(raw.len() as u64, format)?;
        log::info!(
            "Finalizing {} ({} data bytes, {} bytes total)",
            destination.display(),
            raw.len(),
            raw.len() + wav_format::WAV_HEADER_SIZE
        );

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| CaptureError::io("failed to create directory", e))?;
        }

        let mut out = BufWriter::new(
            File::create(destination).map_err(|e| CaptureError::io("failed to create wav file", e))?,
        );
        out.write_all(&header)
            .map_err(|e| CaptureError::io("failed to write wav header", e))?;
        out.write_all(&raw)
            .map_err(|e| CaptureError::io("failed to write wav data", e))?;
        out.flush().map_err(|e| CaptureError::io("failed to flush wav file", e))?;

        remove_temp_store(source)?;

        // build_header already rejected lengths that do not fit in u32.
        Ok(raw.len() as u32)
    }
}

impl Drop for RawSampleSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close temp store {}: {}", self.path.display(), e);
        }
    }
}

/// Delete the temporary store. A store that is already gone is not an error.
pub fn remove_temp_store(path: &Path) -> Result<(), CaptureError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaptureError::io("failed to delete temp store", e)),
    }
}
