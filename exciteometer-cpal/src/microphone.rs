//! cpal microphone capture device.
//!
//! cpal streams are not `Send` on every host, so the stream is built, played
//! and dropped on a dedicated thread. Its callback converts each buffer to
//! the configured PCM layout and hands the bytes over a bounded channel; the
//! handle reassembles them into fixed-size frames for the capture loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig, SupportedBufferSize};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use exciteometer_core::models::error::CaptureError;
use exciteometer_core::models::format::AudioFormatSpec;
use exciteometer_core::traits::capture_device::{CaptureDevice, DeviceHandle};

use crate::convert::{i16_to_f32, u16_to_f32, PcmConverter};
use crate::device_enumerator::find_input_device;

/// Converted chunks buffered between the stream callback and the reader.
const CHUNK_QUEUE_DEPTH: usize = 64;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(20);

type Chunk = Result<Vec<u8>, String>;

/// Microphone input through the cpal default host.
#[derive(Debug, Clone)]
pub struct CpalMicDevice {
    device_name: Option<String>,
    read_timeout: Duration,
}

impl CpalMicDevice {
    /// Capture from the system default microphone.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Capture from the input device with this exact name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// How long a read waits for audio before reporting a read error.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl Default for CpalMicDevice {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureDevice for CpalMicDevice {
    type Handle = CpalCaptureHandle;

    fn minimum_buffer_size(&self, format: &AudioFormatSpec) -> usize {
        // 20 ms of audio when the host does not report a usable range.
        let floor = (format.byte_rate() / 50) as usize;
        let Ok(device) = find_input_device(self.device_name.as_deref()) else {
            return floor;
        };
        let Ok(supported) = device.default_input_config() else {
            return floor;
        };

        match supported.buffer_size() {
            SupportedBufferSize::Range { min, .. } if *min > 0 => {
                let device_rate = u64::from(supported.sample_rate().0.max(1));
                let frames = u64::from(*min) * u64::from(format.sample_rate()) / device_rate;
                (frames as usize * usize::from(format.block_align())).max(floor)
            }
            _ => floor,
        }
    }

    fn open(&mut self, format: &AudioFormatSpec, buffer_size: usize) -> Result<CpalCaptureHandle, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));
        let (chunk_tx, chunk_rx) = bounded::<Chunk>(CHUNK_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = bounded::<Result<String, CaptureError>>(1);

        let device_name = self.device_name.clone();
        let converter = PcmConverter::new(format.sample_rate(), format.channels());
        let thread_running = Arc::clone(&running);
        let thread_dropped = Arc::clone(&dropped);

        let thread = thread::Builder::new()
            .name("cpal-mic-capture".into())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), converter, chunk_tx, thread_dropped) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while thread_running.load(Ordering::SeqCst) {
                    thread::sleep(STREAM_POLL_INTERVAL);
                }
                if let Err(e) = stream.pause() {
                    log::debug!("Failed to pause input stream: {}", e);
                }
            })
            .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to spawn mic thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(name)) => {
                log::info!(
                    "Microphone '{}' open: {} Hz, {} ch, {} byte frames",
                    name,
                    format.sample_rate(),
                    format.channels(),
                    buffer_size
                );
                Ok(CpalCaptureHandle {
                    receiver: chunk_rx,
                    pending: Vec::with_capacity(buffer_size * 2),
                    running,
                    thread: Some(thread),
                    dropped,
                    read_timeout: self.read_timeout,
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::DeviceUnavailable(
                    "mic thread exited before the stream opened".into(),
                ))
            }
        }
    }
}

/// Open handle on a running cpal input stream.
pub struct CpalCaptureHandle {
    receiver: Receiver<Chunk>,
    pending: Vec<u8>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    read_timeout: Duration,
}

impl DeviceHandle for CpalCaptureHandle {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, CaptureError> {
        while self.pending.len() < buffer.len() {
            match self.receiver.recv_timeout(self.read_timeout) {
                Ok(Ok(chunk)) => self.pending.extend_from_slice(&chunk),
                Ok(Err(message)) => return Err(CaptureError::ReadError(message)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CaptureError::ReadError("timed out waiting for audio".into()))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::ReadError("audio stream closed".into()))
                }
            }
        }

        let n = buffer.len();
        buffer.copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                log::warn!("Dropped {} audio chunks while the reader fell behind", dropped);
            }
        }
        self.pending.clear();
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream(
    device_name: Option<&str>,
    converter: PcmConverter,
    sender: Sender<Chunk>,
    dropped: Arc<AtomicU64>,
) -> Result<(cpal::Stream, String), CaptureError> {
    let device = find_input_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to get input config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = usize::from(config.channels.max(1));
    let source_rate = config.sample_rate.0;

    log::debug!(
        "Input config for '{}': format={:?} sample_rate={}Hz channels={}",
        name,
        sample_format,
        source_rate,
        channels
    );

    let err_sender = sender.clone();
    let err_fn = move |err: cpal::StreamError| {
        let _ = err_sender.try_send(Err(err.to_string()));
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            forward_converted(converter, channels, source_rate, sender, dropped, |s: f32| s),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            forward_converted(converter, channels, source_rate, sender, dropped, i16_to_f32),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            forward_converted(converter, channels, source_rate, sender, dropped, u16_to_f32),
            err_fn,
            None,
        ),
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to start stream: {}", e)))?;

    Ok((stream, name))
}

/// Stream callback: convert the buffer and queue it without blocking.
///
/// The callback owns the converter so resampler state carries across buffers.
fn forward_converted<T, F>(
    mut converter: PcmConverter,
    channels: usize,
    source_rate: u32,
    sender: Sender<Chunk>,
    dropped: Arc<AtomicU64>,
    convert: F,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static
where
    T: Copy + 'static,
    F: Fn(T) -> f32 + Copy + Send + 'static,
{
    move |data: &[T], _: &cpal::InputCallbackInfo| {
        let bytes = converter.process(data, channels, source_rate, convert);
        if bytes.is_empty() {
            return;
        }
        if let Err(TrySendError::Full(_)) = sender.try_send(Ok(bytes)) {
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
