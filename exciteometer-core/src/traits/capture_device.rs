use crate::models::error::CaptureError;
use crate::models::format::AudioFormatSpec;

/// An open capture stream owned by the capture loop.
///
/// Moved onto the capture thread when recording starts and handed back to
/// the controlling thread when the loop exits.
pub trait DeviceHandle: Send + 'static {
    /// Block until `buffer` is filled (or the device returns early) and
    /// report how many bytes were written into it.
    ///
    /// A returned error applies to this read only; the caller may read again.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, CaptureError>;

    /// Release the underlying device. Called once when capture ends.
    fn close(&mut self);
}

/// Source of raw little-endian PCM frames, e.g. a microphone.
pub trait CaptureDevice: Send {
    type Handle: DeviceHandle;

    /// Smallest read size, in bytes, the device supports for `format`.
    fn minimum_buffer_size(&self, format: &AudioFormatSpec) -> usize;

    /// Acquire the device. Fails with `CaptureError::DeviceUnavailable`
    /// when it cannot be opened.
    fn open(&mut self, format: &AudioFormatSpec, buffer_size: usize) -> Result<Self::Handle, CaptureError>;
}
