use parking_lot::Mutex;

use exciteometer_core::{CaptureError, CaptureState, Session, SessionDelegate};

/// Keeps the live meter reading and reports capture problems on stderr.
#[derive(Default)]
pub struct ConsoleDelegate {
    last_sample: Mutex<Option<f64>>,
}

impl ConsoleDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent per-frame loudness of the current or last session.
    pub fn last_sample(&self) -> Option<f64> {
        *self.last_sample.lock()
    }
}

impl SessionDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &CaptureState) {
        if state.is_recording() {
            *self.last_sample.lock() = None;
        }
        log::debug!("state → {:?}", state);
    }

    fn on_loudness_sample(&self, decibel: f64) {
        *self.last_sample.lock() = Some(decibel);
    }

    fn on_error(&self, error: &CaptureError) {
        eprintln!("capture: {}", error);
    }

    fn on_session_finished(&self, session: &Session) {
        log::debug!("finished '{}'", session.label());
    }
}
