use aircast_media::frame::AudioFrame;

use crate::state::AppState;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Async completions feeding back into the actor. Everything that can race
/// with a state reset carries the tag it was issued under (`signature`,
/// `session_id`, cooldown `token`); staleness is detected where the event is
/// consumed, never by ambient flags.
#[derive(Debug)]
pub enum InternalEvent {
    // DJ transition loop
    SchedulerTick,
    GenerationFinished {
        signature: String,
        audio: Option<Vec<u8>>,
        error: Option<String>,
    },
    SegmentPlaybackFinished {
        signature: String,
    },
    CooldownElapsed {
        token: u64,
    },

    // Live call session (all tagged with the session id they belong to)
    CallConnected {
        session_id: u64,
    },
    CallerJoined {
        session_id: u64,
        caller_name: String,
    },
    CallerLeft {
        session_id: u64,
    },
    CallInputFrame {
        session_id: u64,
        frame: AudioFrame,
    },
    CallInputFailed {
        session_id: u64,
        error: String,
    },
    CallAudioChunk {
        session_id: u64,
        pcm: Vec<i16>,
        sample_rate: u32,
    },
    CallInterrupted {
        session_id: u64,
    },
    CallHangUpIntent {
        session_id: u64,
    },
    CallLinkClosed {
        session_id: u64,
        error: Option<String>,
    },
    ChunkPlayoutDone {
        session_id: u64,
        seq: u64,
    },
    DrainDeadlineReached {
        session_id: u64,
    },

    Toast(String),
}
