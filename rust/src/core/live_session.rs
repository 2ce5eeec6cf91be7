use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use aircast_media::frame::{AudioFrame, SAMPLE_RATE};
use aircast_media::pairing::{generate_pairing_code, normalize_pairing_code};

use super::ducking::DuckOwner;
use super::remote_input::{CallInput, GuestAudioSender, SyntheticInput};
use super::AppCore;
use crate::actions::CallInputKind;
use crate::state::{CallState, CallStatus};
use crate::updates::{CoreMsg, InternalEvent};

/// Typed event feed for one session. Input sources and voice links post
/// through this; every event carries the session id it was issued under, so
/// a superseded session's late posts are recognized and dropped where they
/// are consumed.
#[derive(Clone)]
pub struct SessionEvents {
    tx: flume::Sender<CoreMsg>,
    session_id: u64,
}

impl SessionEvents {
    pub(super) fn new(tx: flume::Sender<CoreMsg>, session_id: u64) -> Self {
        Self { tx, session_id }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    fn post(&self, event: InternalEvent) {
        let _ = self.tx.send(CoreMsg::Internal(Box::new(event)));
    }

    pub fn connected(&self) {
        self.post(InternalEvent::CallConnected {
            session_id: self.session_id,
        });
    }

    pub fn caller_joined(&self, caller_name: String) {
        self.post(InternalEvent::CallerJoined {
            session_id: self.session_id,
            caller_name,
        });
    }

    pub fn caller_left(&self) {
        self.post(InternalEvent::CallerLeft {
            session_id: self.session_id,
        });
    }

    pub fn input_frame(&self, frame: AudioFrame) {
        self.post(InternalEvent::CallInputFrame {
            session_id: self.session_id,
            frame,
        });
    }

    pub fn input_failed(&self, error: String) {
        self.post(InternalEvent::CallInputFailed {
            session_id: self.session_id,
            error,
        });
    }

    pub fn audio_chunk(&self, pcm: Vec<i16>, sample_rate: u32) {
        self.post(InternalEvent::CallAudioChunk {
            session_id: self.session_id,
            pcm,
            sample_rate,
        });
    }

    pub fn interrupted(&self) {
        self.post(InternalEvent::CallInterrupted {
            session_id: self.session_id,
        });
    }

    pub fn hang_up_intent(&self) {
        self.post(InternalEvent::CallHangUpIntent {
            session_id: self.session_id,
        });
    }

    pub fn closed(&self, error: Option<String>) {
        self.post(InternalEvent::CallLinkClosed {
            session_id: self.session_id,
            error,
        });
    }
}

/// Session-scoped settings handed to the voice backend when a link opens.
#[derive(Debug, Clone)]
pub struct VoiceLinkConfig {
    pub voice: String,
    pub language: String,
    pub persona: Option<String>,
}

/// One open duplex conversation with the voice backend.
pub trait VoiceLink: Send {
    /// Forward one caller audio frame upstream.
    fn send_audio(&mut self, frame: &AudioFrame);

    /// Confirm receipt of the backend's hang-up intent.
    fn acknowledge_hang_up(&mut self) {}

    /// Stop the stream. Must be idempotent.
    fn close(&mut self);
}

/// Factory for voice links. Implementations post `connected`, audio chunks,
/// interruptions, the hang-up intent, and `closed` through the given
/// `SessionEvents`.
pub trait VoiceBackend: Send + Sync {
    fn open(
        &self,
        config: VoiceLinkConfig,
        events: SessionEvents,
    ) -> Result<Box<dyn VoiceLink>, String>;
}

/// Offline backend that echoes caller audio straight back as assistant
/// chunks. Lets the whole call pipeline run without credentials; used by
/// the cli `host` command and the e2e tests.
#[derive(Debug, Default)]
pub struct LoopbackVoiceBackend;

impl VoiceBackend for LoopbackVoiceBackend {
    fn open(
        &self,
        _config: VoiceLinkConfig,
        events: SessionEvents,
    ) -> Result<Box<dyn VoiceLink>, String> {
        events.connected();
        Ok(Box::new(LoopbackLink {
            events,
            closed: false,
        }))
    }
}

struct LoopbackLink {
    events: SessionEvents,
    closed: bool,
}

impl VoiceLink for LoopbackLink {
    fn send_audio(&mut self, frame: &AudioFrame) {
        if self.closed {
            return;
        }
        if let Ok(pcm) = frame.pcm() {
            self.events.audio_chunk(pcm, SAMPLE_RATE);
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// The playout ordering law, kept free of I/O so it is testable on its own:
/// each chunk starts at `max(next_at, now)` and `next_at` advances by the
/// chunk's duration, so starts are non-decreasing and chunks neither
/// overlap nor leave a gap under in-order arrival. Barge-in resets the
/// cursor to "now".
#[derive(Debug)]
pub(super) struct PlayoutSchedule {
    next_at: Option<Instant>,
}

impl PlayoutSchedule {
    pub(super) fn new() -> Self {
        Self { next_at: None }
    }

    pub(super) fn schedule(&mut self, now: Instant, duration: Duration) -> Instant {
        let start = match self.next_at {
            Some(at) if at > now => at,
            _ => now,
        };
        self.next_at = Some(start + duration);
        start
    }

    pub(super) fn interrupt(&mut self, now: Instant) {
        self.next_at = Some(now);
    }

    /// Time until already-scheduled audio has finished playing.
    pub(super) fn remaining(&self, now: Instant) -> Duration {
        self.next_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

pub(super) struct LiveCall {
    session_id: u64,
    input: Box<dyn CallInput>,
    link: Option<Box<dyn VoiceLink>>,
    guest_audio: Option<GuestAudioSender>,
    schedule: PlayoutSchedule,
    /// Cancellation gate for chunks scheduled but not yet played. Barge-in
    /// and non-graceful teardown flip it; a fresh gate replaces it so later
    /// chunks are unaffected.
    cancel_gate: Arc<AtomicBool>,
    pending_chunks: u64,
    chunk_seq: u64,
    feedback_seq: u64,
    muted: bool,
    end_reason: Option<String>,
}

impl AppCore {
    pub(super) fn handle_start_live_call(&mut self, kind: CallInputKind) {
        // Starting a new session supersedes the previous one: its tagged
        // events become inert, and its resources are stopped right here.
        if self.call.is_some() {
            debug!("superseding previous live call session");
            self.teardown_superseded_call();
        }

        self.session_seq += 1;
        let session_id = self.session_seq;
        let events = SessionEvents::new(self.core_sender.clone(), session_id);

        let mut pairing_code = None;
        let mut input: Box<dyn CallInput> = match kind {
            CallInputKind::Synthetic => Box::new(SyntheticInput::new()),
            CallInputKind::RemoteCaller => {
                let Some(relay_url) = self.config.relay_url.clone() else {
                    self.toast("Relay url missing: set `relay_url` in aircast_config.json");
                    return;
                };
                let code = self
                    .config
                    .pairing_code
                    .as_deref()
                    .map(normalize_pairing_code)
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(generate_pairing_code);
                pairing_code = Some(code.clone());
                Box::new(super::remote_input::RemoteCallerInput::new(
                    relay_url, code,
                ))
            }
            #[cfg(feature = "microphone")]
            CallInputKind::Microphone => Box::new(super::remote_input::MicrophoneInput::new()),
            #[cfg(not(feature = "microphone"))]
            CallInputKind::Microphone => {
                self.toast("Microphone input requires the `microphone` feature");
                return;
            }
        };

        if let Err(err) = input.start(self.runtime.handle(), events.clone()) {
            // Input acquisition failures share the single unrecoverable
            // error path: one notification, no session left behind.
            self.toast(format!("Call input failed: {err}"));
            return;
        }

        let link_config = VoiceLinkConfig {
            voice: self.config.voice.clone(),
            language: self.config.language.clone(),
            persona: self.config.persona.clone(),
        };
        let link = match self.deps.voice_backend.open(link_config, events) {
            Ok(link) => link,
            Err(err) => {
                input.stop();
                self.toast(format!("Voice backend failed: {err}"));
                return;
            }
        };

        let guest_audio = input.guest_audio();
        info!(session_id, input = ?kind, "live call session starting");
        self.call = Some(LiveCall {
            session_id,
            input,
            link: Some(link),
            guest_audio,
            schedule: PlayoutSchedule::new(),
            cancel_gate: Arc::new(AtomicBool::new(false)),
            pending_chunks: 0,
            chunk_seq: 0,
            feedback_seq: 0,
            muted: false,
            end_reason: None,
        });
        self.state.call = Some(CallState {
            session_id,
            status: CallStatus::Connecting,
            pairing_code,
            caller_name: None,
            is_muted: false,
        });
        self.emit_state();
    }

    pub(super) fn handle_end_live_call(&mut self) {
        let active = self
            .state
            .call
            .as_ref()
            .map(|c| c.status.is_active())
            .unwrap_or(false);
        if !active {
            return;
        }
        if let Some(call) = self.call.as_mut() {
            call.end_reason = Some("host_hangup".to_string());
        }
        self.cleanup_live_call(true);
    }

    pub(super) fn handle_toggle_call_mute(&mut self) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        call.muted = !call.muted;
        let muted = call.muted;
        if let Some(state) = self.state.call.as_mut() {
            state.is_muted = muted;
        }
        self.emit_state();
    }

    /// Resolve an event's session tag against the current call. Stale tags
    /// are the expected outcome of superseded sessions; they are logged and
    /// dropped, never surfaced.
    fn current_call(&mut self, session_id: u64) -> Option<&mut LiveCall> {
        let is_current = self
            .call
            .as_ref()
            .map(|call| call.session_id == session_id)
            .unwrap_or(false);
        if !is_current {
            debug!(session_id, "event for superseded session ignored");
            return None;
        }
        self.call.as_mut()
    }

    fn call_status(&self) -> Option<&CallStatus> {
        self.state.call.as_ref().map(|c| &c.status)
    }

    fn set_call_status(&mut self, status: CallStatus) {
        if let Some(call) = self.state.call.as_mut() {
            call.status = status;
            self.emit_state();
        }
    }

    pub(super) fn on_call_connected(&mut self, session_id: u64) {
        if self.current_call(session_id).is_none() {
            return;
        }
        info!(session_id, "live call connected");
        self.ducker.duck(DuckOwner::LiveCall);
        self.set_call_status(CallStatus::Live);
    }

    pub(super) fn on_caller_joined(&mut self, session_id: u64, caller_name: String) {
        if self.current_call(session_id).is_none() {
            return;
        }
        info!(session_id, caller = %caller_name, "caller joined");
        if let Some(state) = self.state.call.as_mut() {
            state.caller_name = Some(caller_name);
        }
        self.emit_state();
    }

    pub(super) fn on_caller_left(&mut self, session_id: u64) {
        if self.current_call(session_id).is_none() {
            return;
        }
        info!(session_id, "caller left");
        if let Some(state) = self.state.call.as_mut() {
            state.caller_name = None;
        }
        self.emit_state();
    }

    pub(super) fn on_call_input_frame(&mut self, session_id: u64, frame: AudioFrame) {
        let accepting = matches!(
            self.call_status(),
            Some(CallStatus::Connecting | CallStatus::Live)
        );
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        if !accepting || call.muted {
            return;
        }
        if let Some(link) = call.link.as_mut() {
            link.send_audio(&frame);
        }
    }

    pub(super) fn on_call_audio_chunk(&mut self, session_id: u64, pcm: Vec<i16>, sample_rate: u32) {
        let accepting = self
            .call_status()
            .map(|s| s.accepts_backend_audio())
            .unwrap_or(false);
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        if !accepting || pcm.is_empty() {
            return;
        }

        let now = Instant::now();
        let duration =
            Duration::from_micros(pcm.len() as u64 * 1_000_000 / u64::from(sample_rate.max(1)));
        let start = call.schedule.schedule(now, duration);
        call.chunk_seq += 1;
        call.pending_chunks += 1;
        let seq = call.chunk_seq;
        let gate = call.cancel_gate.clone();

        // The paired caller hears the reply leg too.
        if let Some(sender) = call.guest_audio.clone() {
            call.feedback_seq += 1;
            sender.send(AudioFrame::from_pcm(call.feedback_seq, &pcm));
        }

        let output = self.deps.audio_output.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep_until(start).await;
            if !gate.load(Ordering::Relaxed) {
                output.play_call_chunk(&pcm, sample_rate);
                tokio::time::sleep(duration).await;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ChunkPlayoutDone { session_id, seq },
            )));
        });
    }

    pub(super) fn on_call_interrupted(&mut self, session_id: u64) {
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        info!(session_id, "caller barge-in, cancelling scheduled audio");
        call.cancel_gate.store(true, Ordering::Relaxed);
        call.cancel_gate = Arc::new(AtomicBool::new(false));
        call.schedule.interrupt(Instant::now());
        self.deps.audio_output.cancel_call_audio();
    }

    pub(super) fn on_call_hang_up_intent(&mut self, session_id: u64) {
        let live = matches!(self.call_status(), Some(CallStatus::Live));
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        if !live {
            return;
        }
        info!(session_id, "backend requested hang-up");
        if let Some(link) = call.link.as_mut() {
            link.acknowledge_hang_up();
        }
        call.end_reason = Some("assistant_hangup".to_string());
        // Stop taking new work now; the goodbye that is already scheduled
        // gets to finish before the line goes dead.
        call.input.stop();
        let drain = call.schedule.remaining(Instant::now());
        let tx = self.core_sender.clone();
        self.set_call_status(CallStatus::Ending);
        self.runtime.spawn(async move {
            tokio::time::sleep(drain).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::DrainDeadlineReached { session_id },
            )));
        });
    }

    pub(super) fn on_drain_deadline(&mut self, session_id: u64) {
        if self.current_call(session_id).is_none() {
            return;
        }
        self.cleanup_live_call(true);
    }

    pub(super) fn on_call_link_closed(&mut self, session_id: u64, error: Option<String>) {
        let status = self.call_status().cloned();
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        call.link = None;
        match error {
            Some(err) => {
                // Backend connection failures and backend-reported errors
                // all land here: notify once, tear down without waiting for
                // in-flight audio.
                warn!(session_id, error = %err, "live call failed");
                call.end_reason = Some("error".to_string());
                self.toast(format!("Live call failed: {err}"));
                self.cleanup_live_call(false);
            }
            None => match status {
                Some(CallStatus::Ending) => self.finish_live_call_if_drained(),
                _ => {
                    info!(session_id, "backend closed the stream");
                    call.end_reason = Some("link_closed".to_string());
                    self.cleanup_live_call(true);
                }
            },
        }
    }

    pub(super) fn on_call_input_failed(&mut self, session_id: u64, error: String) {
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        warn!(session_id, error = %error, "call input failed");
        call.end_reason = Some("error".to_string());
        self.toast(format!("Call input failed: {error}"));
        self.cleanup_live_call(false);
    }

    pub(super) fn on_chunk_playout_done(&mut self, session_id: u64, seq: u64) {
        let Some(call) = self.current_call(session_id) else {
            return;
        };
        debug!(session_id, seq, "chunk playout done");
        call.pending_chunks = call.pending_chunks.saturating_sub(1);
        self.finish_live_call_if_drained();
    }

    /// Two-phase teardown. Phase one (here): stop the input, close the
    /// link, stop accepting new chunks. Phase two (graceful only): release
    /// shared resources after the last scheduled chunk's completion event.
    fn cleanup_live_call(&mut self, graceful: bool) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        call.input.stop();
        if let Some(mut link) = call.link.take() {
            link.close();
        }
        if graceful {
            self.set_call_status(CallStatus::Ending);
            self.finish_live_call_if_drained();
        } else {
            call.cancel_gate.store(true, Ordering::Relaxed);
            self.deps.audio_output.cancel_call_audio();
            self.finish_live_call();
        }
    }

    fn finish_live_call_if_drained(&mut self) {
        let drained = self
            .call
            .as_ref()
            .map(|c| c.link.is_none() && c.pending_chunks == 0)
            .unwrap_or(false);
        let ending = matches!(self.call_status(), Some(CallStatus::Ending));
        if drained && ending {
            self.finish_live_call();
        }
    }

    fn finish_live_call(&mut self) {
        let Some(call) = self.call.take() else {
            return;
        };
        let reason = call
            .end_reason
            .unwrap_or_else(|| "ended".to_string());
        info!(session_id = call.session_id, reason = %reason, "live call ended");
        self.ducker.release(DuckOwner::LiveCall);
        self.set_call_status(CallStatus::Ended { reason });
    }

    /// Quiet teardown when a new session takes the slot: no Ended emission
    /// for the old session beyond the state overwrite that follows.
    fn teardown_superseded_call(&mut self) {
        if let Some(mut call) = self.call.take() {
            call.input.stop();
            if let Some(mut link) = call.link.take() {
                link.close();
            }
            call.cancel_gate.store(true, Ordering::Relaxed);
        }
        self.deps.audio_output.cancel_call_audio();
        self.ducker.release(DuckOwner::LiveCall);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playout_starts_are_non_decreasing_and_gapless() {
        let mut schedule = PlayoutSchedule::new();
        let now = Instant::now();
        let chunk = Duration::from_millis(200);

        let first = schedule.schedule(now, chunk);
        assert_eq!(first, now);
        // Second chunk arrives while the first still plays: butt-joined.
        let second = schedule.schedule(now + Duration::from_millis(50), chunk);
        assert_eq!(second, now + chunk);
        // Third arrives after a silence gap: starts immediately.
        let idle = now + Duration::from_secs(2);
        let third = schedule.schedule(idle, chunk);
        assert_eq!(third, idle);

        assert!(first <= second && second <= third);
    }

    #[test]
    fn interrupt_resets_cursor_to_now() {
        let mut schedule = PlayoutSchedule::new();
        let now = Instant::now();
        for _ in 0..5 {
            schedule.schedule(now, Duration::from_millis(500));
        }
        assert!(schedule.remaining(now) >= Duration::from_millis(2_500));

        let barge = now + Duration::from_millis(100);
        schedule.interrupt(barge);
        assert_eq!(schedule.remaining(barge), Duration::ZERO);
        // The next chunk starts at the barge-in point, not the old cursor.
        assert_eq!(schedule.schedule(barge, Duration::from_millis(200)), barge);
    }

    #[test]
    fn remaining_drains_to_zero() {
        let mut schedule = PlayoutSchedule::new();
        let now = Instant::now();
        schedule.schedule(now, Duration::from_millis(300));
        assert_eq!(
            schedule.remaining(now + Duration::from_millis(100)),
            Duration::from_millis(200)
        );
        assert_eq!(
            schedule.remaining(now + Duration::from_secs(1)),
            Duration::ZERO
        );
    }
}
