pub mod config;
pub mod ducking;
pub mod generator;
pub mod live_session;
pub mod output;
pub mod remote_input;
pub mod transition;

use std::sync::{Arc, RwLock};

use flume::Sender;
use tracing::debug;

use crate::actions::AppAction;
use crate::state::{AppState, DjState};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use self::config::AppConfig;
use self::ducking::{DuckOwner, Ducker, VolumeControl};
use self::generator::SegmentGenerator;
use self::live_session::{LiveCall, VoiceBackend};
use self::output::AudioOutput;
use self::transition::{DjCommand, TrackSource, TransitionScheduler, TransitionTuning};

/// Collaborators the host application wires in. Everything the core cannot
/// own itself (the page's playback state, the generation backend, the
/// live-voice backend, the speakers, the volume knob) arrives here as an
/// explicitly constructed trait object; there are no ambient singletons.
pub struct CoreDeps {
    pub track_source: Arc<dyn TrackSource>,
    pub generator: Arc<dyn SegmentGenerator>,
    pub voice_backend: Arc<dyn VoiceBackend>,
    pub audio_output: Arc<dyn AudioOutput>,
    pub volume: Arc<dyn VolumeControl>,
}

/// Single-threaded app actor. All state lives here and is mutated only by
/// `handle_message` on the actor thread; async work is spawned onto the
/// owned runtime and reports back through tagged `InternalEvent`s.
pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    deps: CoreDeps,

    dj: TransitionScheduler,
    ducker: Ducker,

    call: Option<LiveCall>,
    session_seq: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        deps: CoreDeps,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let dj = TransitionScheduler::new(TransitionTuning::from_config(&config), config.dj_enabled);
        let ducker = Ducker::new(
            deps.volume.clone(),
            config.music_volume,
            config.ducked_volume,
        );
        let mut state = AppState::empty();
        state.dj.enabled = config.dj_enabled;

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            deps,
            dj,
            ducker,
            call: None,
            session_seq: 0,
        };

        // Tick driver for the transition loop. The tick handler itself
        // never awaits; it only reads the track source and spawns work.
        let tick_interval = this.config.tick_interval();
        let tick_tx = this.core_sender.clone();
        this.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick_tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::SchedulerTick)))
                    .is_err()
                {
                    break;
                }
            }
        });

        // Make state() immediately usable.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    pub(super) fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    pub(super) fn toast(&mut self, message: impl Into<String>) {
        self.state.toast = Some(message.into());
        self.emit_state();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => self.handle_action(action),
            CoreMsg::Internal(event) => self.handle_internal(*event),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        debug!(action = action.tag(), "dispatching action");
        match action {
            AppAction::StartLiveCall { input } => self.handle_start_live_call(input),
            AppAction::EndLiveCall => self.handle_end_live_call(),
            AppAction::ToggleCallMute => self.handle_toggle_call_mute(),
            AppAction::SetDjEnabled { enabled } => {
                self.dj.set_enabled(enabled);
                self.sync_dj_state();
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::SchedulerTick => self.on_scheduler_tick(),
            InternalEvent::GenerationFinished {
                signature,
                audio,
                error,
            } => {
                let commands = self.dj.on_generation_finished(&signature, audio, error);
                self.run_dj_commands(commands);
                self.sync_dj_state();
            }
            InternalEvent::SegmentPlaybackFinished { signature } => {
                // Release the duck no matter what the scheduler thinks; the
                // segment audibly stopped.
                self.ducker.release(DuckOwner::DjSegment);
                let commands = self.dj.on_segment_playback_finished(&signature);
                self.run_dj_commands(commands);
                self.sync_dj_state();
            }
            InternalEvent::CooldownElapsed { token } => {
                self.dj.on_cooldown_elapsed(token);
                self.sync_dj_state();
            }

            InternalEvent::CallConnected { session_id } => self.on_call_connected(session_id),
            InternalEvent::CallerJoined {
                session_id,
                caller_name,
            } => self.on_caller_joined(session_id, caller_name),
            InternalEvent::CallerLeft { session_id } => self.on_caller_left(session_id),
            InternalEvent::CallInputFrame { session_id, frame } => {
                self.on_call_input_frame(session_id, frame)
            }
            InternalEvent::CallInputFailed { session_id, error } => {
                self.on_call_input_failed(session_id, error)
            }
            InternalEvent::CallAudioChunk {
                session_id,
                pcm,
                sample_rate,
            } => self.on_call_audio_chunk(session_id, pcm, sample_rate),
            InternalEvent::CallInterrupted { session_id } => self.on_call_interrupted(session_id),
            InternalEvent::CallHangUpIntent { session_id } => {
                self.on_call_hang_up_intent(session_id)
            }
            InternalEvent::CallLinkClosed { session_id, error } => {
                self.on_call_link_closed(session_id, error)
            }
            InternalEvent::ChunkPlayoutDone { session_id, seq } => {
                self.on_chunk_playout_done(session_id, seq)
            }
            InternalEvent::DrainDeadlineReached { session_id } => {
                self.on_drain_deadline(session_id)
            }

            InternalEvent::Toast(message) => self.toast(message),
        }
    }

    fn on_scheduler_tick(&mut self) {
        let snapshot = self.deps.track_source.now_playing();
        let commands = self.dj.on_tick(snapshot);
        self.run_dj_commands(commands);
        self.sync_dj_state();
    }

    fn sync_dj_state(&mut self) {
        let dj = DjState {
            phase: self.dj.phase(),
            track: self.dj.signature().map(str::to_string),
            segment_ready: self.dj.has_buffered_segment(),
            enabled: self.dj.is_enabled(),
        };
        if dj != self.state.dj {
            self.state.dj = dj;
            self.emit_state();
        }
    }

    fn run_dj_commands(&mut self, commands: Vec<DjCommand>) {
        for command in commands {
            match command {
                DjCommand::RequestSegment { signature, request } => {
                    let generator = self.deps.generator.clone();
                    let tx = self.core_sender.clone();
                    self.runtime.spawn_blocking(move || {
                        let (audio, error) = match generator.generate(&request) {
                            Ok(segment) => (Some(segment.audio), None),
                            Err(err) => (None, Some(err)),
                        };
                        let _ = tx.send(CoreMsg::Internal(Box::new(
                            InternalEvent::GenerationFinished {
                                signature,
                                audio,
                                error,
                            },
                        )));
                    });
                }
                DjCommand::PlaySegment { signature, audio } => {
                    self.ducker.duck(DuckOwner::DjSegment);
                    let tx = self.core_sender.clone();
                    self.deps.audio_output.play_segment(
                        audio,
                        Box::new(move || {
                            let _ = tx.send(CoreMsg::Internal(Box::new(
                                InternalEvent::SegmentPlaybackFinished { signature },
                            )));
                        }),
                    );
                }
                DjCommand::ArmCooldown { token, delay } => {
                    let tx = self.core_sender.clone();
                    self.runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(CoreMsg::Internal(Box::new(
                            InternalEvent::CooldownElapsed { token },
                        )));
                    });
                }
            }
        }
    }
}
