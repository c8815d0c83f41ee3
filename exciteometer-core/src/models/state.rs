use super::session::Session;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → recording → stopping → finalized
///            ↑                      │
///            └──── next start() ────┘  (fresh session run)
/// ```
///
/// A failed `start()` leaves the state as it was.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Recording { label: String },
    Stopping,
    Finalized(Session),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    /// Whether `start()` may begin a new run from this state.
    pub fn accepts_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Finalized(_))
    }

    /// Label of the session in progress or just finalized.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Recording { label } => Some(label),
            Self::Finalized(session) => Some(session.label()),
            _ => None,
        }
    }
}

/// Per-session counters for debugging capture problems.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub frames_read: u64,
    pub bytes_written: u64,
    pub read_errors: u64,
    pub silent_frames: u64,
    pub samples_kept: u64,
}
