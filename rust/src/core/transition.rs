use std::time::Duration;

use tracing::{debug, info};

use super::config::AppConfig;
use super::generator::SegmentRequest;
use crate::state::DjPhase;

/// One pull from the "now playing" collaborator. Any concrete source (media
/// backend, test fixture) satisfies `TrackSource`; the scheduler never
/// talks to a page directly.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub title: String,
    pub artist: String,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub next_track: Option<String>,
    pub playlist: Vec<String>,
}

pub trait TrackSource: Send + Sync {
    fn now_playing(&self) -> Option<TrackSnapshot>;
}

pub fn track_signature(title: &str, artist: &str) -> String {
    format!("{title}|{artist}")
}

#[derive(Debug, Clone)]
pub(super) struct TransitionTuning {
    pub window_min_secs: f64,
    pub window_max_secs: f64,
    pub play_threshold_secs: f64,
    pub seek_tolerance_secs: f64,
    pub cooldown: Duration,
    pub style: String,
    pub voice: String,
    pub language: String,
}

impl TransitionTuning {
    pub(super) fn from_config(config: &AppConfig) -> Self {
        Self {
            window_min_secs: config.generation_window_min_secs,
            window_max_secs: config.generation_window_max_secs,
            play_threshold_secs: config.play_threshold_secs,
            seek_tolerance_secs: config.seek_tolerance_secs,
            cooldown: config.cooldown(),
            style: config.style.clone(),
            voice: config.voice.clone(),
            language: config.language.clone(),
        }
    }
}

/// Side effects the core must execute for a transition step. The scheduler
/// itself never spawns work or blocks; it only decides.
#[derive(Debug)]
pub(super) enum DjCommand {
    RequestSegment {
        signature: String,
        request: SegmentRequest,
    },
    PlaySegment {
        signature: String,
        audio: Vec<u8>,
    },
    ArmCooldown {
        token: u64,
        delay: Duration,
    },
}

#[derive(Debug)]
struct BufferedSegment {
    signature: String,
    audio: Vec<u8>,
}

/// The DJ transition loop: IDLE -> GENERATING -> READY -> PLAYING ->
/// COOLDOWN -> IDLE, driven by one tick per second of the playing track.
/// Buffered audio is tagged with the signature it was generated for and is
/// never played against any other signature.
pub(super) struct TransitionScheduler {
    tuning: TransitionTuning,
    enabled: bool,
    phase: DjPhase,
    signature: Option<String>,
    last_position: f64,
    pending_signature: Option<String>,
    buffered: Option<BufferedSegment>,
    cooldown_token: u64,
}

impl TransitionScheduler {
    pub(super) fn new(tuning: TransitionTuning, enabled: bool) -> Self {
        Self {
            tuning,
            enabled,
            phase: DjPhase::Idle,
            signature: None,
            last_position: 0.0,
            pending_signature: None,
            buffered: None,
            cooldown_token: 0,
        }
    }

    pub(super) fn phase(&self) -> DjPhase {
        self.phase
    }

    pub(super) fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub(super) fn has_buffered_segment(&self) -> bool {
        self.buffered.is_some()
    }

    pub(super) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled && self.phase != DjPhase::Playing {
            self.reset_to_idle();
        }
    }

    pub(super) fn on_tick(&mut self, snapshot: Option<TrackSnapshot>) -> Vec<DjCommand> {
        let Some(snap) = snapshot else {
            return Vec::new();
        };
        let sig = track_signature(&snap.title, &snap.artist);

        let same_track = self.signature.as_deref() == Some(sig.as_str());
        if same_track {
            // Seek detection: a backward jump beyond the tolerance means
            // whatever we prepared no longer fits the moment.
            if snap.position_secs + self.tuning.seek_tolerance_secs < self.last_position {
                debug!(
                    from = self.last_position,
                    to = snap.position_secs,
                    "seek detected, resetting transition state"
                );
                self.reset_to_idle();
            }
        } else {
            if self.signature.is_some() {
                debug!(signature = %sig, "track changed, resetting transition state");
            }
            self.signature = Some(sig.clone());
            self.reset_to_idle();
        }
        self.last_position = snap.position_secs;

        let time_left = (snap.duration_secs - snap.position_secs).max(0.0);
        let mut commands = Vec::new();
        match self.phase {
            DjPhase::Idle => {
                let in_window = time_left > self.tuning.window_min_secs
                    && time_left < self.tuning.window_max_secs;
                if self.enabled && in_window && !snap.title.is_empty() && !snap.artist.is_empty() {
                    info!(signature = %sig, time_left, "requesting transition segment");
                    self.phase = DjPhase::Generating;
                    self.pending_signature = Some(sig.clone());
                    commands.push(DjCommand::RequestSegment {
                        signature: sig.clone(),
                        request: self.build_request(&snap),
                    });
                }
            }
            DjPhase::Ready => {
                if time_left < self.tuning.play_threshold_secs {
                    match self.buffered.take() {
                        // Re-validate immediately before playback; races with
                        // the tick above are cheap to lose and fatal to win.
                        Some(buffered) if buffered.signature == sig => {
                            info!(signature = %sig, time_left, "playing buffered segment");
                            self.phase = DjPhase::Playing;
                            commands.push(DjCommand::PlaySegment {
                                signature: sig.clone(),
                                audio: buffered.audio,
                            });
                        }
                        _ => {
                            debug!(signature = %sig, "buffered segment no longer matches, dropping");
                            self.phase = DjPhase::Idle;
                        }
                    }
                }
            }
            DjPhase::Generating | DjPhase::Playing | DjPhase::Cooldown => {}
        }
        commands
    }

    pub(super) fn on_generation_finished(
        &mut self,
        signature: &str,
        audio: Option<Vec<u8>>,
        error: Option<String>,
    ) -> Vec<DjCommand> {
        if self.phase != DjPhase::Generating
            || self.pending_signature.as_deref() != Some(signature)
        {
            // Expected race outcome, not an error: the track changed or the
            // machine reset while the backend was working.
            debug!(signature = %signature, "stale generation result discarded");
            return Vec::new();
        }
        self.pending_signature = None;

        if self.signature.as_deref() != Some(signature) {
            debug!(signature = %signature, "track changed mid-generation, discarding result");
            return vec![self.enter_cooldown()];
        }
        match audio {
            Some(bytes) if !bytes.is_empty() => {
                info!(signature = %signature, bytes = bytes.len(), "segment buffered");
                self.buffered = Some(BufferedSegment {
                    signature: signature.to_string(),
                    audio: bytes,
                });
                self.phase = DjPhase::Ready;
                Vec::new()
            }
            _ => {
                info!(
                    signature = %signature,
                    error = error.as_deref().unwrap_or("no audio returned"),
                    "generation failed, cooling down"
                );
                vec![self.enter_cooldown()]
            }
        }
    }

    pub(super) fn on_segment_playback_finished(&mut self, signature: &str) -> Vec<DjCommand> {
        if self.phase != DjPhase::Playing {
            debug!(signature = %signature, "playback finished after reset, ignoring");
            return Vec::new();
        }
        vec![self.enter_cooldown()]
    }

    pub(super) fn on_cooldown_elapsed(&mut self, token: u64) {
        if self.phase == DjPhase::Cooldown && token == self.cooldown_token {
            self.phase = DjPhase::Idle;
        }
    }

    fn enter_cooldown(&mut self) -> DjCommand {
        self.phase = DjPhase::Cooldown;
        self.cooldown_token += 1;
        DjCommand::ArmCooldown {
            token: self.cooldown_token,
            delay: self.tuning.cooldown,
        }
    }

    /// Discards buffered and in-flight work. In-flight backend requests are
    /// not aborted; their results arrive tagged and get discarded instead.
    fn reset_to_idle(&mut self) {
        self.phase = DjPhase::Idle;
        self.pending_signature = None;
        self.buffered = None;
    }

    fn build_request(&self, snap: &TrackSnapshot) -> SegmentRequest {
        SegmentRequest {
            current_track: format!("{} by {}", snap.title, snap.artist),
            next_track: snap.next_track.clone(),
            playlist_context: snap.playlist.clone(),
            style: self.tuning.style.clone(),
            voice: self.tuning.voice.clone(),
            language: self.tuning.language.clone(),
        }
    }
}
