use crate::models::error::CaptureError;
use crate::models::session::Session;
use crate::models::state::CaptureState;

/// Event delegate for capture session notifications.
///
/// `on_loudness_sample` and read errors arrive on the capture thread; the
/// other callbacks run on the thread that called `start`/`stop`.
/// Implementations should marshal to a UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called for every decibel sample kept by the estimator.
    fn on_loudness_sample(&self, decibel: f64);

    /// Called when an error occurs during capture or finalization.
    fn on_error(&self, error: &CaptureError);

    /// Called once the session is committed to the registry.
    fn on_session_finished(&self, session: &Session);
}
