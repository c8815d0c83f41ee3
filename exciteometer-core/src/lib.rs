//! # exciteometer-core
//!
//! Platform-agnostic core of the Exciteometer: captures labelled audio
//! sessions, scores each one with a coarse loudness estimate, writes it out
//! as a PCM WAV file and ranks the results loudest first.
//!
//! Capture backends implement the `CaptureDevice` trait and plug into the
//! generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! exciteometer-core (this crate)
//! ├── traits/       ← CaptureDevice, LoudnessEstimator, SessionControl, SessionDelegate
//! ├── models/       ← CaptureError, CaptureState, CaptureConfiguration, AudioFormatSpec, Session
//! ├── processing/   ← WAV header codec, loudness estimation
//! ├── session/      ← CaptureSession (state machine), SessionRegistry
//! └── storage/      ← RawSampleSink, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::CaptureConfiguration;
pub use models::error::CaptureError;
pub use models::format::AudioFormatSpec;
pub use models::session::Session;
pub use models::state::{CaptureDiagnostics, CaptureState};
pub use processing::loudness::{LastByteEstimator, LoudnessSamples};
pub use session::capture::CaptureSession;
pub use session::registry::{SessionRegistry, SharedRegistry};
pub use storage::raw_sink::RawSampleSink;
pub use traits::capture_device::{CaptureDevice, DeviceHandle};
pub use traits::estimator::LoudnessEstimator;
pub use traits::session_control::SessionControl;
pub use traits::session_delegate::SessionDelegate;
