#[derive(Clone, Debug, serde::Serialize)]
pub struct AppState {
    pub rev: u64,
    pub dj: DjState,
    pub call: Option<CallState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            dj: DjState::empty(),
            call: None,
            toast: None,
        }
    }
}

/// Observable slice of the DJ transition loop.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct DjState {
    pub phase: DjPhase,
    /// Signature (title|artist) of the track the loop is tracking.
    pub track: Option<String>,
    pub segment_ready: bool,
    pub enabled: bool,
}

impl DjState {
    pub fn empty() -> Self {
        Self {
            phase: DjPhase::Idle,
            track: None,
            segment_ready: false,
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum DjPhase {
    Idle,
    Generating,
    Ready,
    Playing,
    Cooldown,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct CallState {
    pub session_id: u64,
    pub status: CallStatus,
    /// Pairing code published on the relay, when the input is a remote caller.
    pub pairing_code: Option<String>,
    pub caller_name: Option<String>,
    pub is_muted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum CallStatus {
    Connecting,
    Live,
    Ending,
    Ended { reason: String },
}

impl CallStatus {
    /// A session holds the single live-call slot until it reaches Ended.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Ended { .. })
    }

    pub fn accepts_backend_audio(&self) -> bool {
        matches!(self, Self::Live)
    }
}
