use thiserror::Error;

/// Errors that can occur while capturing, measuring, or persisting a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a session is already recording")]
    AlreadyRecording,

    #[error("device read failed: {0}")]
    ReadError(String),

    #[error("i/o error: {0}")]
    IoError(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}

impl CaptureError {
    /// Wraps an `std::io::Error` with a short context prefix.
    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        Self::IoError(format!("{}: {}", context, err))
    }
}
