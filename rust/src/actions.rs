/// How a live call session gets its caller audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallInputKind {
    /// Deterministic tone source; no devices, no network. Used by tests and
    /// the cli when no caller hardware is around.
    Synthetic,
    /// A phone paired through the relay under this host's pairing code.
    RemoteCaller,
    /// Local capture device (requires the `microphone` feature).
    Microphone,
}

#[derive(Debug, Clone)]
pub enum AppAction {
    // Live call
    StartLiveCall { input: CallInputKind },
    EndLiveCall,
    ToggleCallMute,

    // DJ loop
    SetDjEnabled { enabled: bool },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag.
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::StartLiveCall { .. } => "StartLiveCall",
            AppAction::EndLiveCall => "EndLiveCall",
            AppAction::ToggleCallMute => "ToggleCallMute",
            AppAction::SetDjEnabled { .. } => "SetDjEnabled",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
