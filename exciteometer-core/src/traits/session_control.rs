use crate::models::error::CaptureError;
use crate::models::session::Session;
use crate::models::state::CaptureState;

/// Controller-facing session interface.
///
/// What an external UI drives: begin a labelled capture, end it, and
/// observe the state in between.
pub trait SessionControl: Send {
    /// Current session state.
    fn state(&self) -> CaptureState;

    /// Begin capturing under `label`. Transitions: idle/finalized → recording.
    fn start(&mut self, label: &str) -> Result<(), CaptureError>;

    /// Stop capturing and commit the session.
    /// Transitions: recording → stopping → finalized. No-op in any other state.
    fn stop(&mut self) -> Result<Option<Session>, CaptureError>;
}
