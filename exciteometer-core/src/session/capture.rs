use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::session::Session;
use crate::models::state::{CaptureDiagnostics, CaptureState};
use crate::processing::loudness::LoudnessSamples;
use crate::session::registry::SharedRegistry;
use crate::storage::metadata::{self, SessionMetadata};
use crate::storage::raw_sink::{self, RawSampleSink};
use crate::traits::capture_device::{CaptureDevice, DeviceHandle};
use crate::traits::estimator::LoudnessEstimator;
use crate::traits::session_control::SessionControl;
use crate::traits::session_delegate::SessionDelegate;

/// Everything the capture loop owns, handed back to the controlling thread
/// when it exits.
struct LoopOutput<H> {
    handle: H,
    sink: RawSampleSink,
    samples: LoudnessSamples,
    diagnostics: CaptureDiagnostics,
    failure: Option<CaptureError>,
}

/// One start → stop run. A new one is created for every `start()`.
struct ActiveRun<H> {
    pending: Session,
    output_path: PathBuf,
    running: Arc<AtomicBool>,
    loop_handle: thread::JoinHandle<LoopOutput<H>>,
}

/// Read → measure → buffer loop executed on the capture thread.
struct CaptureLoop<H> {
    handle: H,
    sink: RawSampleSink,
    estimator: Box<dyn LoudnessEstimator>,
    frame: Vec<u8>,
    running: Arc<AtomicBool>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    max_consecutive_read_errors: Option<u32>,
}

impl<H: DeviceHandle> CaptureLoop<H> {
    fn run(mut self) -> LoopOutput<H> {
        let mut samples = LoudnessSamples::new();
        let mut diagnostics = CaptureDiagnostics::default();
        let mut failure: Option<CaptureError> = None;
        let mut write_failed = false;
        let mut consecutive_errors = 0u32;

        while self.running.load(Ordering::SeqCst) {
            let read = match self.handle.read(&mut self.frame) {
                Ok(n) => {
                    consecutive_errors = 0;
                    n.min(self.frame.len())
                }
                Err(e) => {
                    diagnostics.read_errors += 1;
                    consecutive_errors += 1;
                    log::warn!("Capture read failed ({} in a row): {}", consecutive_errors, e);
                    if let Some(ref delegate) = self.delegate {
                        delegate.on_error(&e);
                    }
                    if self
                        .max_consecutive_read_errors
                        .is_some_and(|max| consecutive_errors >= max)
                    {
                        log::error!("Giving up after {} consecutive read errors", consecutive_errors);
                        if failure.is_none() {
                            failure = Some(e);
                        }
                        break;
                    }
                    continue;
                }
            };
            if read == 0 {
                continue;
            }

            diagnostics.frames_read += 1;
            let frame = &self.frame[..read];

            match samples.record(self.estimator.as_ref(), frame) {
                Some(decibel) => {
                    diagnostics.samples_kept += 1;
                    if let Some(ref delegate) = self.delegate {
                        delegate.on_loudness_sample(decibel);
                    }
                }
                None => diagnostics.silent_frames += 1,
            }

            // A failed write is reported once and never retried.
            if !write_failed {
                match self.sink.append(frame) {
                    Ok(()) => diagnostics.bytes_written += read as u64,
                    Err(e) => {
                        log::error!("Failed to write audio data: {}", e);
                        write_failed = true;
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }
        }

        LoopOutput {
            handle: self.handle,
            sink: self.sink,
            samples,
            diagnostics,
            failure,
        }
    }
}

/// Drives one capture device through labelled sessions.
///
/// Data flow:
/// ```text
/// [CaptureDevice] → frame → [LoudnessEstimator] → samples ─┐
///                        └→ [RawSampleSink] (temp store)   ├→ stop() → WAV + Session → [SessionRegistry]
/// ```
///
/// The capture loop runs on its own thread and owns the device handle, the
/// sink and the sample sequence. `stop()` joins it and takes them back, so
/// every write the loop made happens-before the aggregate is computed.
pub struct CaptureSession<D: CaptureDevice> {
    device: D,
    config: CaptureConfiguration,
    registry: SharedRegistry,
    delegate: Option<Arc<dyn SessionDelegate>>,
    state: CaptureState,
    active: Option<ActiveRun<D::Handle>>,
    last_diagnostics: Option<CaptureDiagnostics>,
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(device: D, config: CaptureConfiguration, registry: SharedRegistry) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            device,
            config,
            registry,
            delegate: None,
            state: CaptureState::Idle,
            active: None,
            last_diagnostics: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.state.clone()
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Counters from the most recently stopped run.
    pub fn last_diagnostics(&self) -> Option<&CaptureDiagnostics> {
        self.last_diagnostics.as_ref()
    }

    /// Start capture under `label`. Transitions: idle/finalized → recording.
    pub fn start(&mut self, label: &str) -> Result<(), CaptureError> {
        if self.state.is_recording() {
            return Err(CaptureError::AlreadyRecording);
        }
        if !self.state.accepts_start() {
            return Err(CaptureError::ConfigurationFailed(
                "can only start from idle or finalized state".into(),
            ));
        }

        let format = self.config.format;
        let buffer_size = format.frame_size(self.device.minimum_buffer_size(&format));

        fs::create_dir_all(&self.config.output_directory)
            .map_err(|e| CaptureError::io("failed to create output directory", e))?;
        let output_path = next_output_path(&self.config.output_directory);

        let mut handle = self.device.open(&format, buffer_size)?;
        let sink = match RawSampleSink::open(self.config.temp_file_path()) {
            Ok(sink) => sink,
            Err(e) => {
                handle.close();
                return Err(e);
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let capture_loop = CaptureLoop {
            handle,
            sink,
            estimator: self.config.estimator.clone(),
            frame: vec![0u8; buffer_size],
            running: Arc::clone(&running),
            delegate: self.delegate.clone(),
            max_consecutive_read_errors: self.config.max_consecutive_read_errors,
        };

        let loop_handle = thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || capture_loop.run())
            .map_err(|e| CaptureError::io("failed to spawn capture thread", e))?;

        log::info!(
            "Start recording '{}' ({} Hz, {} ch, {} byte frames) → {}",
            label,
            format.sample_rate(),
            format.channels(),
            buffer_size,
            output_path.display()
        );

        self.active = Some(ActiveRun {
            pending: Session::pending(label),
            output_path,
            running,
            loop_handle,
        });
        self.set_state(CaptureState::Recording {
            label: label.to_string(),
        });
        Ok(())
    }

    /// Stop capture, materialize the WAV and commit the session.
    /// Transitions: recording → stopping → finalized.
    ///
    /// Returns `Ok(None)` when nothing is recording. On `Err`, the session
    /// has still been committed to the registry and can be read from
    /// `CaptureState::Finalized`.
    pub fn stop(&mut self) -> Result<Option<Session>, CaptureError> {
        if !self.state.is_recording() {
            log::debug!("stop() ignored in state {:?}", self.state);
            return Ok(None);
        }
        let Some(run) = self.active.take() else {
            return Ok(None);
        };

        log::info!("Stop recording '{}'", run.pending.label());
        self.set_state(CaptureState::Stopping);

        run.running.store(false, Ordering::SeqCst);
        let joined = run.loop_handle.join();

        let mut errors: Vec<CaptureError> = Vec::new();
        let mut sample_count = 0;
        let aggregate = match joined {
            Ok(mut output) => {
                let aggregate = output.samples.aggregate();
                sample_count = output.samples.len();
                output.handle.close();
                if let Some(e) = output.failure.take() {
                    errors.push(e);
                }
                if let Err(e) = output.sink.close() {
                    errors.push(e);
                }
                self.last_diagnostics = Some(output.diagnostics);
                aggregate
            }
            Err(_) => {
                log::error!("Capture thread panicked; committing without samples");
                errors.push(CaptureError::IoError("capture thread panicked".into()));
                f64::NEG_INFINITY
            }
        };

        let committed = run.pending.commit(aggregate, run.output_path.clone());

        let temp_path = self.config.temp_file_path();
        match RawSampleSink::finalize(&temp_path, &run.output_path, &self.config.format) {
            Ok(data_bytes) => {
                if self.config.write_metadata {
                    if let Err(e) = self.write_sidecar(&committed, sample_count, data_bytes) {
                        errors.push(e);
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to materialize {}: {}", run.output_path.display(), e);
                errors.push(e);
            }
        }
        if let Err(e) = raw_sink::remove_temp_store(&temp_path) {
            errors.push(e);
        }

        self.registry.lock().insert(committed.clone());
        self.set_state(CaptureState::Finalized(committed.clone()));

        log::info!(
            "Session '{}' finalized: {} dB from {} samples",
            committed.label(),
            committed.display_loudness(),
            sample_count
        );
        if let Some(ref delegate) = self.delegate {
            delegate.on_session_finished(&committed);
        }

        match errors.into_iter().next() {
            Some(e) => {
                if let Some(ref delegate) = self.delegate {
                    delegate.on_error(&e);
                }
                Err(e)
            }
            None => Ok(Some(committed)),
        }
    }

    // --- Internal helpers ---

    fn set_state(&mut self, new_state: CaptureState) {
        self.state = new_state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&self.state);
        }
    }

    fn write_sidecar(&self, session: &Session, sample_count: usize, data_bytes: u32) -> Result<(), CaptureError> {
        let meta = SessionMetadata::for_session(
            session,
            self.config.format,
            sample_count,
            data_bytes,
            self.config.estimator.name(),
        )?;
        let path = session
            .output_file_path()
            .ok_or_else(|| CaptureError::IoError("session has no output file".into()))?;
        metadata::write_metadata(&meta, path)
    }
}

impl<D: CaptureDevice> SessionControl for CaptureSession<D> {
    fn state(&self) -> CaptureState {
        CaptureSession::state(self)
    }

    fn start(&mut self, label: &str) -> Result<(), CaptureError> {
        CaptureSession::start(self, label)
    }

    fn stop(&mut self) -> Result<Option<Session>, CaptureError> {
        CaptureSession::stop(self)
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            log::warn!("Session '{}' dropped while recording; abandoning it", run.pending.label());
            run.running.store(false, Ordering::SeqCst);
        }
    }
}

/// `<unix-millis>.wav` in `dir`, bumped forward on collision.
fn next_output_path(dir: &Path) -> PathBuf {
    let mut stamp = chrono::Utc::now().timestamp_millis();
    loop {
        let candidate = dir.join(format!("{}.wav", stamp));
        if !candidate.exists() {
            return candidate;
        }
        stamp += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use approx::assert_abs_diff_eq;
    use parking_lot::Mutex;

    use crate::models::format::AudioFormatSpec;
    use crate::processing::loudness::LastByteEstimator;
    use crate::processing::wav_format::parse_header;
    use crate::session::registry::SessionRegistry;

    type Script = VecDeque<Result<Vec<u8>, CaptureError>>;

    /// Replays a fixed list of reads, then returns empty reads until stopped.
    struct ScriptedDevice {
        script: Option<Script>,
        frame_bytes: usize,
        consumed: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
        available: bool,
    }

    impl ScriptedDevice {
        fn new(script: Vec<Result<Vec<u8>, CaptureError>>, frame_bytes: usize) -> Self {
            Self {
                script: Some(script.into()),
                frame_bytes,
                consumed: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicBool::new(false)),
                available: true,
            }
        }

        fn unavailable() -> Self {
            Self {
                available: false,
                ..Self::new(Vec::new(), 2)
            }
        }
    }

    struct ScriptedHandle {
        script: Script,
        consumed: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl DeviceHandle for ScriptedHandle {
        fn read(&mut self, buffer: &mut [u8]) -> Result<usize, CaptureError> {
            match self.script.pop_front() {
                Some(step) => {
                    self.consumed.fetch_add(1, Ordering::SeqCst);
                    let bytes = step?;
                    buffer[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Ok(0)
                }
            }
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl CaptureDevice for ScriptedDevice {
        type Handle = ScriptedHandle;

        fn minimum_buffer_size(&self, _format: &AudioFormatSpec) -> usize {
            self.frame_bytes
        }

        fn open(&mut self, _format: &AudioFormatSpec, _buffer_size: usize) -> Result<ScriptedHandle, CaptureError> {
            if !self.available {
                return Err(CaptureError::DeviceUnavailable("no microphone".into()));
            }
            Ok(ScriptedHandle {
                script: self.script.take().unwrap_or_default(),
                consumed: Arc::clone(&self.consumed),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    /// Reads the decibel value straight out of the frame's first 8 bytes.
    struct EncodedEstimator;

    impl LoudnessEstimator for EncodedEstimator {
        fn sample(&self, frame: &[u8]) -> Option<f64> {
            let bytes: [u8; 8] = frame.get(..8)?.try_into().ok()?;
            Some(f64::from_le_bytes(bytes))
        }

        fn name(&self) -> &str {
            "encoded"
        }

        fn clone_box(&self) -> Box<dyn LoudnessEstimator> {
            Box::new(EncodedEstimator)
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<CaptureState>>,
        samples: Mutex<Vec<f64>>,
        errors: Mutex<Vec<CaptureError>>,
        finished: Mutex<Vec<Session>>,
    }

    impl SessionDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: &CaptureState) {
            self.states.lock().push(state.clone());
        }

        fn on_loudness_sample(&self, decibel: f64) {
            self.samples.lock().push(decibel);
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }

        fn on_session_finished(&self, session: &Session) {
            self.finished.lock().push(session.clone());
        }
    }

    fn config_in(dir: &Path) -> CaptureConfiguration {
        CaptureConfiguration {
            output_directory: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn wait_for(consumed: &AtomicUsize, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while consumed.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "capture loop did not consume the script");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn encoded_frames(values: &[f64]) -> Vec<Result<Vec<u8>, CaptureError>> {
        values.iter().map(|v| Ok(v.to_le_bytes().to_vec())).collect()
    }

    #[test]
    fn end_to_end_session() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(encoded_frames(&[-5.0, -10.0, -15.0]), 8);
        let consumed = Arc::clone(&device.consumed);
        let closed = Arc::clone(&device.closed);
        let registry = SessionRegistry::shared();
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, Arc::clone(&registry)).unwrap();
        session.start("Entry 1").unwrap();
        assert!(session.state().is_recording());
        wait_for(&consumed, 3);

        let committed = session.stop().unwrap().unwrap();
        assert_eq!(committed.label(), "Entry 1");
        assert_abs_diff_eq!(committed.aggregate_loudness(), -10.0, epsilon = 1e-12);
        assert!(closed.load(Ordering::SeqCst));

        let path = committed.output_file_path().unwrap();
        assert!(path.exists());
        let file_data = fs::read(path).unwrap();
        let header = parse_header(&file_data).unwrap();
        assert_eq!(header.data_length, 24);
        assert_eq!(file_data.len(), 44 + 24);

        assert!(!dir.path().join("record_temp.raw").exists());
        assert!(path.with_extension("metadata.json").exists());

        let all = registry.lock().all();
        assert_eq!(all, vec![committed.clone()]);
        assert_eq!(session.state(), CaptureState::Finalized(committed));

        let diagnostics = session.last_diagnostics().unwrap();
        assert_eq!(diagnostics.frames_read, 3);
        assert_eq!(diagnostics.bytes_written, 24);
        assert_eq!(diagnostics.samples_kept, 3);
    }

    #[test]
    fn default_estimator_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        // Last bytes 0x80 (full scale), 0x40 (half), 0x00 (silent).
        let script = vec![Ok(vec![0x00, 0x80]), Ok(vec![0x00, 0x40]), Ok(vec![0x12, 0x00])];
        let device = ScriptedDevice::new(script, 2);
        let consumed = Arc::clone(&device.consumed);
        let config = CaptureConfiguration {
            estimator: Box::new(LastByteEstimator),
            write_metadata: false,
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, SessionRegistry::shared()).unwrap();
        session.start("noise").unwrap();
        wait_for(&consumed, 3);
        let committed = session.stop().unwrap().unwrap();

        let expected = (0.0 + 20.0 * 0.5f64.log10()) / 2.0;
        assert_abs_diff_eq!(committed.aggregate_loudness(), expected, epsilon = 1e-9);

        let path = committed.output_file_path().unwrap();
        assert!(!path.with_extension("metadata.json").exists());
        let reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(session.last_diagnostics().unwrap().silent_frames, 1);
    }

    #[test]
    fn session_without_samples_keeps_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(Vec::new(), 2);
        let mut session = CaptureSession::new(device, config_in(dir.path()), SessionRegistry::shared()).unwrap();

        session.start("quiet").unwrap();
        let committed = session.stop().unwrap().unwrap();

        assert_eq!(committed.aggregate_loudness(), f64::NEG_INFINITY);
        let file_data = fs::read(committed.output_file_path().unwrap()).unwrap();
        assert_eq!(file_data.len(), 44);
        assert_eq!(parse_header(&file_data).unwrap().data_length, 0);
    }

    #[test]
    fn stop_when_not_recording_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::shared();
        let device = ScriptedDevice::new(Vec::new(), 2);
        let mut session = CaptureSession::new(device, config_in(dir.path()), Arc::clone(&registry)).unwrap();

        assert_eq!(session.stop(), Ok(None));
        assert!(session.state().is_idle());
        assert!(registry.lock().is_empty());

        session.start("once").unwrap();
        session.stop().unwrap();
        assert_eq!(session.stop(), Ok(None));
        assert_eq!(registry.lock().len(), 1);
    }

    #[test]
    fn start_while_recording_fails() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(Vec::new(), 2);
        let mut session = CaptureSession::new(device, config_in(dir.path()), SessionRegistry::shared()).unwrap();

        session.start("first").unwrap();
        assert_eq!(session.start("second"), Err(CaptureError::AlreadyRecording));
        assert_eq!(
            session.state(),
            CaptureState::Recording {
                label: "first".into()
            }
        );

        let committed = session.stop().unwrap().unwrap();
        assert_eq!(committed.label(), "first");
    }

    #[test]
    fn unavailable_device_stays_idle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::shared();
        let mut session =
            CaptureSession::new(ScriptedDevice::unavailable(), config_in(dir.path()), Arc::clone(&registry)).unwrap();

        let result = session.start("Entry 1");
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
        assert!(session.state().is_idle());
        assert!(registry.lock().is_empty());
        assert!(!dir.path().join("record_temp.raw").exists());
    }

    #[test]
    fn read_errors_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = encoded_frames(&[-4.0]);
        script.push(Err(CaptureError::ReadError("overrun".into())));
        script.push(Err(CaptureError::ReadError("overrun".into())));
        script.extend(encoded_frames(&[-8.0]));
        let device = ScriptedDevice::new(script, 8);
        let consumed = Arc::clone(&device.consumed);
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, SessionRegistry::shared()).unwrap();
        session.start("bumpy").unwrap();
        wait_for(&consumed, 4);
        let committed = session.stop().unwrap().unwrap();

        assert_abs_diff_eq!(committed.aggregate_loudness(), -6.0, epsilon = 1e-12);
        let diagnostics = session.last_diagnostics().unwrap();
        assert_eq!(diagnostics.read_errors, 2);
        assert_eq!(diagnostics.bytes_written, 16);
    }

    #[test]
    fn read_error_threshold_ends_capture_but_commits() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = encoded_frames(&[-3.0]);
        for _ in 0..3 {
            script.push(Err(CaptureError::ReadError("device lost".into())));
        }
        let device = ScriptedDevice::new(script, 8);
        let consumed = Arc::clone(&device.consumed);
        let registry = SessionRegistry::shared();
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            max_consecutive_read_errors: Some(3),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, Arc::clone(&registry)).unwrap();
        session.start("flaky").unwrap();
        wait_for(&consumed, 4);

        let result = session.stop();
        assert_eq!(result, Err(CaptureError::ReadError("device lost".into())));

        let all = registry.lock().all();
        assert_eq!(all.len(), 1);
        assert_abs_diff_eq!(all[0].aggregate_loudness(), -3.0, epsilon = 1e-12);
        assert!(all[0].output_file_path().unwrap().exists());
        assert!(matches!(session.state(), CaptureState::Finalized(_)));
    }

    #[test]
    fn restart_creates_fresh_run() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(encoded_frames(&[-20.0]), 8);
        let consumed = Arc::clone(&device.consumed);
        let registry = SessionRegistry::shared();
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, Arc::clone(&registry)).unwrap();
        session.start("Entry 1").unwrap();
        wait_for(&consumed, 1);
        let first = session.stop().unwrap().unwrap();

        // The script is spent; the second run records nothing.
        session.start("Entry 2").unwrap();
        let second = session.stop().unwrap().unwrap();

        assert_abs_diff_eq!(first.aggregate_loudness(), -20.0, epsilon = 1e-12);
        assert_eq!(second.aggregate_loudness(), f64::NEG_INFINITY);
        assert_ne!(first.output_file_path(), second.output_file_path());

        let labels: Vec<String> = registry.lock().all().iter().map(|s| s.label().to_string()).collect();
        assert_eq!(labels, ["Entry 1", "Entry 2"]);
    }

    #[test]
    fn delegate_sees_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(encoded_frames(&[-1.0, -2.0]), 8);
        let consumed = Arc::clone(&device.consumed);
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };
        let delegate = Arc::new(RecordingDelegate::default());

        let mut session = CaptureSession::new(device, config, SessionRegistry::shared()).unwrap();
        session.set_delegate(delegate.clone());
        session.start("watched").unwrap();
        wait_for(&consumed, 2);
        let committed = session.stop().unwrap().unwrap();

        assert_eq!(*delegate.samples.lock(), vec![-1.0, -2.0]);
        assert!(delegate.errors.lock().is_empty());
        assert_eq!(*delegate.finished.lock(), vec![committed.clone()]);

        let states = delegate.states.lock();
        assert_eq!(
            *states,
            vec![
                CaptureState::Recording {
                    label: "watched".into()
                },
                CaptureState::Stopping,
                CaptureState::Finalized(committed),
            ]
        );
    }

    #[test]
    fn finalize_failure_still_commits() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(encoded_frames(&[-7.0]), 8);
        let consumed = Arc::clone(&device.consumed);
        let registry = SessionRegistry::shared();
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, Arc::clone(&registry)).unwrap();
        session.start("Entry 1").unwrap();
        wait_for(&consumed, 1);

        // A directory where the WAV should go.
        let output_path = session.active.as_ref().unwrap().output_path.clone();
        fs::create_dir(&output_path).unwrap();

        let result = session.stop();
        assert!(matches!(result, Err(CaptureError::IoError(_))));

        let all = registry.lock().all();
        assert_eq!(all.len(), 1);
        assert_abs_diff_eq!(all[0].aggregate_loudness(), -7.0, epsilon = 1e-12);
        assert_eq!(session.state(), CaptureState::Finalized(all[0].clone()));
        assert!(!dir.path().join("record_temp.raw").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failure_keeps_measuring() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let temp_store = dir.path().join("record_temp.raw");
        std::os::unix::fs::symlink(full, &temp_store).unwrap();

        // The small first frame sits in the sink's buffer; the large second
        // one forces a flush into the full device.
        let mut large = vec![0u8; 8192];
        large[..8].copy_from_slice(&(-20.0f64).to_le_bytes());
        let mut script = encoded_frames(&[-10.0]);
        script.push(Ok(large));
        script.extend(encoded_frames(&[-30.0]));
        let device = ScriptedDevice::new(script, 8192);
        let consumed = Arc::clone(&device.consumed);
        let registry = SessionRegistry::shared();
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, Arc::clone(&registry)).unwrap();
        session.start("noisy").unwrap();
        wait_for(&consumed, 3);
        fs::remove_file(&temp_store).unwrap();

        match session.stop() {
            Err(CaptureError::IoError(message)) => assert!(message.starts_with("write failed"), "{}", message),
            other => panic!("expected write failure, got {:?}", other),
        }

        let diagnostics = session.last_diagnostics().unwrap();
        assert_eq!(diagnostics.frames_read, 3);
        assert_eq!(diagnostics.samples_kept, 3);
        assert_eq!(diagnostics.bytes_written, 8);

        let all = registry.lock().all();
        assert_eq!(all.len(), 1);
        assert_abs_diff_eq!(all[0].aggregate_loudness(), -20.0, epsilon = 1e-12);
    }

    #[test]
    fn partial_read_keeps_only_bytes_read() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(vec![Ok(vec![1, 2, 3])], 8);
        let consumed = Arc::clone(&device.consumed);
        let config = CaptureConfiguration {
            estimator: Box::new(EncodedEstimator),
            ..config_in(dir.path())
        };

        let mut session = CaptureSession::new(device, config, SessionRegistry::shared()).unwrap();
        session.start("short").unwrap();
        wait_for(&consumed, 1);
        let committed = session.stop().unwrap().unwrap();

        let file_data = fs::read(committed.output_file_path().unwrap()).unwrap();
        assert_eq!(parse_header(&file_data).unwrap().data_length, 3);
        assert_eq!(&file_data[44..], &[1, 2, 3]);

        // Too short for the estimator: measured as silence.
        assert_eq!(committed.aggregate_loudness(), f64::NEG_INFINITY);
        let diagnostics = session.last_diagnostics().unwrap();
        assert_eq!(diagnostics.bytes_written, 3);
        assert_eq!(diagnostics.silent_frames, 1);
    }

    #[test]
    fn failed_restart_keeps_finalized_state() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(Vec::new(), 2);
        let mut session = CaptureSession::new(device, config_in(dir.path()), SessionRegistry::shared()).unwrap();

        session.start("Entry 1").unwrap();
        let committed = session.stop().unwrap().unwrap();

        session.device.available = false;
        let result = session.start("Entry 2");
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
        assert_eq!(session.state(), CaptureState::Finalized(committed));
    }

    #[test]
    fn works_through_session_control() {
        let dir = tempfile::tempdir().unwrap();
        let device = ScriptedDevice::new(Vec::new(), 2);
        let mut control: Box<dyn SessionControl> =
            Box::new(CaptureSession::new(device, config_in(dir.path()), SessionRegistry::shared()).unwrap());

        control.start("boxed").unwrap();
        assert!(control.state().is_recording());
        assert!(control.stop().unwrap().is_some());
        assert!(control.state().is_terminal());
    }

    #[test]
    fn rejects_invalid_configuration() {
        let config = CaptureConfiguration {
            format: AudioFormatSpec::new(0, 1),
            ..Default::default()
        };
        let result = CaptureSession::new(ScriptedDevice::new(Vec::new(), 2), config, SessionRegistry::shared());
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }
}
