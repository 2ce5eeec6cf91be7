#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aircast_core::{
    AudioOutput, SegmentAudio, SegmentGenerator, SegmentRequest, SessionEvents, TrackSnapshot,
    TrackSource, VoiceBackend, VoiceLink, VoiceLinkConfig, VolumeControl,
};
use aircast_media::frame::AudioFrame;

pub fn wait_until(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}

/// Write an `aircast_config.json` with fast timings suitable for tests,
/// merged with the given overrides.
pub fn write_config(data_dir: &Path, overrides: serde_json::Value) {
    let mut config = serde_json::json!({
        "tick_interval_ms": 100,
        "cooldown_secs": 0.3,
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    std::fs::create_dir_all(data_dir).expect("create data dir");
    std::fs::write(data_dir.join("aircast_config.json"), config.to_string())
        .expect("write config");
}

/// Track source the test scripts: set or clear the current snapshot.
#[derive(Clone, Default)]
pub struct ScriptedTrack {
    inner: Arc<Mutex<Option<TrackSnapshot>>>,
}

impl ScriptedTrack {
    pub fn set(&self, title: &str, artist: &str, position: f64, duration: f64) {
        *self.inner.lock().unwrap() = Some(TrackSnapshot {
            title: title.to_string(),
            artist: artist.to_string(),
            position_secs: position,
            duration_secs: duration,
            next_track: None,
            playlist: vec![],
        });
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap() = None;
    }
}

impl TrackSource for ScriptedTrack {
    fn now_playing(&self) -> Option<TrackSnapshot> {
        self.inner.lock().unwrap().clone()
    }
}

/// Records everything the core plays; segment playback completes after
/// `segment_hold_ms` on a worker thread.
pub struct RecordingOutput {
    pub segments: Mutex<Vec<Vec<u8>>>,
    pub chunks: Mutex<Vec<Vec<i16>>>,
    pub cancels: AtomicU64,
    pub segment_hold_ms: u64,
}

impl RecordingOutput {
    pub fn new(segment_hold_ms: u64) -> Self {
        Self {
            segments: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
            cancels: AtomicU64::new(0),
            segment_hold_ms,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.lock().unwrap().len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }
}

impl AudioOutput for RecordingOutput {
    fn play_segment(&self, audio: Vec<u8>, done: Box<dyn FnOnce() + Send>) {
        self.segments.lock().unwrap().push(audio);
        let hold = Duration::from_millis(self.segment_hold_ms);
        std::thread::spawn(move || {
            std::thread::sleep(hold);
            done();
        });
    }

    fn play_call_chunk(&self, pcm: &[i16], _sample_rate: u32) {
        self.chunks.lock().unwrap().push(pcm.to_vec());
    }

    fn cancel_call_audio(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct RecordingVolume {
    pub levels: Mutex<Vec<f32>>,
}

impl VolumeControl for RecordingVolume {
    fn set_volume(&self, level: f32) {
        self.levels.lock().unwrap().push(level);
    }
}

/// Generator that parks until the test feeds it an outcome, for racing
/// completions against track changes.
pub struct GatedGenerator {
    outcomes: Mutex<Receiver<Result<Vec<u8>, String>>>,
}

impl GatedGenerator {
    pub fn new() -> (Self, Sender<Result<Vec<u8>, String>>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            Self {
                outcomes: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl SegmentGenerator for GatedGenerator {
    fn generate(&self, _request: &SegmentRequest) -> Result<SegmentAudio, String> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .recv()
            .unwrap_or_else(|_| Err("generator gate dropped".to_string()));
        outcome.map(|audio| SegmentAudio { audio })
    }
}

pub struct FailingGenerator;

impl SegmentGenerator for FailingGenerator {
    fn generate(&self, _request: &SegmentRequest) -> Result<SegmentAudio, String> {
        Err("backend declined".to_string())
    }
}

/// Voice backend the test drives by hand: captures each session's event
/// feed and counts the frames forwarded upstream.
#[derive(Default)]
pub struct ScriptedBackend {
    sessions: Mutex<Vec<SessionEvents>>,
    pub frames_sent: Arc<AtomicU64>,
    pub hangup_acked: Arc<AtomicBool>,
    pub connect_on_open: bool,
}

impl ScriptedBackend {
    pub fn new(connect_on_open: bool) -> Self {
        Self {
            connect_on_open,
            ..Self::default()
        }
    }

    pub fn session(&self, index: usize) -> SessionEvents {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl VoiceBackend for ScriptedBackend {
    fn open(
        &self,
        _config: VoiceLinkConfig,
        events: SessionEvents,
    ) -> Result<Box<dyn VoiceLink>, String> {
        if self.connect_on_open {
            events.connected();
        }
        self.sessions.lock().unwrap().push(events);
        Ok(Box::new(ScriptedLink {
            frames_sent: self.frames_sent.clone(),
            hangup_acked: self.hangup_acked.clone(),
        }))
    }
}

struct ScriptedLink {
    frames_sent: Arc<AtomicU64>,
    hangup_acked: Arc<AtomicBool>,
}

impl VoiceLink for ScriptedLink {
    fn send_audio(&mut self, _frame: &AudioFrame) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn acknowledge_hang_up(&mut self) {
        self.hangup_acked.store(true, Ordering::Relaxed);
    }

    fn close(&mut self) {}
}
