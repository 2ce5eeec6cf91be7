mod actions;
mod core;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use crate::actions::{AppAction, CallInputKind};
pub use crate::core::config::AppConfig;
pub use crate::core::ducking::VolumeControl;
pub use crate::core::generator::{
    fixture_tone_pcm, FixtureGenerator, HttpSegmentGenerator, SegmentAudio, SegmentGenerator,
    SegmentRequest,
};
pub use crate::core::live_session::{
    LoopbackVoiceBackend, SessionEvents, VoiceBackend, VoiceLink, VoiceLinkConfig,
};
pub use crate::core::output::AudioOutput;
#[cfg(feature = "microphone")]
pub use crate::core::remote_input::MicrophoneInput;
pub use crate::core::remote_input::{CallInput, GuestAudioSender, RemoteCallerInput, SyntheticInput};
pub use crate::core::transition::{track_signature, TrackSnapshot, TrackSource};
pub use crate::core::CoreDeps;
pub use crate::state::*;
pub use crate::updates::*;

/// Host-application callback for state updates, invoked off the actor
/// thread in dispatch order.
pub trait UpdateListener: Send + Sync + 'static {
    fn on_update(&self, update: AppUpdate);
}

/// The one explicitly constructed instance of the broadcast session core.
/// The host application owns it and passes handles to collaborators in via
/// `CoreDeps`; everything else flows through `dispatch` and updates.
pub struct AircastApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl AircastApp {
    pub fn new(data_dir: String, deps: CoreDeps) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "AircastApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                deps,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(guard) => guard.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, listener: Box<dyn UpdateListener>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                listener.on_update(update);
            }
        });
    }
}
