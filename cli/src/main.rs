use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use aircast_core::{
    AircastApp, AppAction, AppUpdate, AudioOutput, CallInputKind, CoreDeps, FixtureGenerator,
    LoopbackVoiceBackend, TrackSnapshot, TrackSource, UpdateListener, VolumeControl,
};
use aircast_media::frame::{AudioFrame, FRAME_MS, FRAME_SAMPLES};
use aircast_media::pairing::normalize_pairing_code;
use aircast_media::protocol::{ControlMessage, LinkStatus};

#[derive(Debug, Parser)]
#[command(name = "aircast-cli")]
#[command(about = "Aircast broadcast session harness for testing and demos")]
struct Cli {
    /// Data directory (aircast_config.json persists here between runs)
    #[arg(long, default_value = ".aircast-cli")]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a host session: publish a pairing code on the relay and loop
    /// caller audio back through the voice pipeline.
    Host {
        /// Relay websocket URL, e.g. ws://127.0.0.1:9400 (written to config)
        #[arg(long)]
        relay: String,

        /// Pairing code to publish (generated when omitted)
        #[arg(long)]
        code: Option<String>,

        /// Seconds to stay on air
        #[arg(long, default_value_t = 60)]
        duration_sec: u64,
    },

    /// Join a relay as a caller: stream a test tone and print traffic.
    Guest {
        /// Relay websocket URL
        #[arg(long, default_value = "ws://127.0.0.1:9400")]
        relay: String,

        /// Host pairing code to join
        #[arg(long)]
        code: String,

        /// Caller name announced to the host
        #[arg(long, default_value = "cli-guest")]
        name: String,

        /// Seconds to stay connected
        #[arg(long, default_value_t = 10)]
        duration_sec: u64,
    },

    /// Run the DJ transition loop against a simulated playlist.
    Dj {
        /// Simulated track length in seconds (must exceed the generation
        /// window for anything to happen)
        #[arg(long, default_value_t = 60.0)]
        track_secs: f64,

        /// Number of simulated tracks to play through
        #[arg(long, default_value_t = 2)]
        tracks: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Host {
            relay,
            code,
            duration_sec,
        } => run_host(&cli.data_dir, &relay, code, duration_sec).await,
        Command::Guest {
            relay,
            code,
            name,
            duration_sec,
        } => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                )
                .try_init();
            run_guest(&relay, &code, &name, duration_sec).await
        }
        Command::Dj { track_secs, tracks } => run_dj(&cli.data_dir, track_secs, tracks).await,
    }
}

fn emit(event: &str, fields: serde_json::Value) {
    let mut line = json!({ "event": event });
    if let (Some(obj), Some(extra)) = (line.as_object_mut(), fields.as_object()) {
        for (key, value) in extra {
            obj.insert(key.clone(), value.clone());
        }
    }
    println!("{line}");
}

/// JSON-lines state printer used by `host` and `dj`.
struct JsonUpdates;

impl UpdateListener for JsonUpdates {
    fn on_update(&self, update: AppUpdate) {
        let AppUpdate::FullState(state) = update;
        emit("state", json!({ "state": state }));
    }
}

/// Counts call chunks and simulates segment playback time; this harness has
/// no speakers of its own.
#[derive(Default)]
struct CountingOutput {
    chunks: AtomicU64,
}

impl AudioOutput for CountingOutput {
    fn play_segment(&self, audio: Vec<u8>, done: Box<dyn FnOnce() + Send>) {
        emit("segment_playing", json!({ "bytes": audio.len() }));
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(2));
            done();
        });
    }

    fn play_call_chunk(&self, pcm: &[i16], _sample_rate: u32) {
        let count = self.chunks.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 50 == 0 {
            emit(
                "call_audio",
                json!({ "chunks": count, "last_samples": pcm.len() }),
            );
        }
    }

    fn cancel_call_audio(&self) {
        emit("call_audio_cancelled", json!({}));
    }
}

struct PrintVolume;

impl VolumeControl for PrintVolume {
    fn set_volume(&self, level: f32) {
        emit("volume", json!({ "level": level }));
    }
}

/// `host` has no music player attached; the DJ loop simply stays idle.
struct SilentSource;

impl TrackSource for SilentSource {
    fn now_playing(&self) -> Option<TrackSnapshot> {
        None
    }
}

fn write_host_config(data_dir: &Path, relay: &str, code: Option<&str>) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;
    let mut config = json!({ "relay_url": relay });
    if let Some(code) = code {
        config["pairing_code"] = json!(normalize_pairing_code(code));
    }
    std::fs::write(data_dir.join("aircast_config.json"), config.to_string())
        .context("write aircast_config.json")?;
    Ok(())
}

async fn run_host(
    data_dir: &Path,
    relay: &str,
    code: Option<String>,
    duration_sec: u64,
) -> anyhow::Result<()> {
    write_host_config(data_dir, relay, code.as_deref())?;

    let deps = CoreDeps {
        track_source: Arc::new(SilentSource),
        generator: Arc::new(FixtureGenerator),
        voice_backend: Arc::new(LoopbackVoiceBackend),
        audio_output: Arc::new(CountingOutput::default()),
        volume: Arc::new(PrintVolume),
    };
    let app = AircastApp::new(data_dir.to_string_lossy().to_string(), deps);
    app.listen_for_updates(Box::new(JsonUpdates));
    app.dispatch(AppAction::StartLiveCall {
        input: CallInputKind::RemoteCaller,
    });

    tokio::time::sleep(Duration::from_secs(duration_sec)).await;
    app.dispatch(AppAction::EndLiveCall);
    // Let the graceful teardown drain before the process exits.
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok(())
}

async fn run_guest(relay: &str, code: &str, name: &str, duration_sec: u64) -> anyhow::Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(relay)
        .await
        .with_context(|| format!("connect to relay {relay}"))?;
    let (mut sink, mut reader) = ws.split();

    let connect = ControlMessage::ConnectGuest {
        target_host_id: normalize_pairing_code(code),
        caller_name: name.to_string(),
    };
    sink.send(Message::Text(connect.encode()?.into()))
        .await
        .context("send CONNECT_GUEST")?;

    let deadline = Instant::now() + Duration::from_secs(duration_sec);
    let mut paired = false;
    let mut tone_phase = 0.0f32;
    let mut seq = 0u64;
    let mut frames_heard = 0u64;
    let mut ticker = tokio::time::interval(Duration::from_millis(u64::from(FRAME_MS)));

    while Instant::now() < deadline {
        tokio::select! {
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match ControlMessage::parse(text.as_str()) {
                        Ok(ControlMessage::Status { status: LinkStatus::Connected }) => {
                            paired = true;
                            emit("paired", json!({ "code": code }));
                        }
                        Ok(ControlMessage::GuestDisconnected) => {
                            emit("host_gone", json!({}));
                            return Ok(());
                        }
                        Ok(ControlMessage::Error { message }) => {
                            return Err(anyhow!("relay error: {message}"));
                        }
                        Ok(other) => emit("control", json!({ "tag": other.tag() })),
                        Err(err) => emit("bad_control", json!({ "error": err.to_string() })),
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    frames_heard += 1;
                    if frames_heard % 50 == 0 {
                        emit("audio", json!({ "frames": frames_heard, "last_bytes": data.len() }));
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(anyhow!("relay stream error: {err}")),
                None | Some(Ok(Message::Close(_))) => {
                    emit("closed", json!({ "frames_heard": frames_heard }));
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                if paired {
                    let step = (2.0 * std::f32::consts::PI * 440.0) / 48_000.0;
                    let mut pcm = Vec::with_capacity(FRAME_SAMPLES);
                    for _ in 0..FRAME_SAMPLES {
                        pcm.push((tone_phase.sin() * (i16::MAX as f32 * 0.15)) as i16);
                        tone_phase += step;
                        if tone_phase > 2.0 * std::f32::consts::PI {
                            tone_phase -= 2.0 * std::f32::consts::PI;
                        }
                    }
                    let frame = AudioFrame::from_pcm(seq, &pcm);
                    seq += 1;
                    sink.send(Message::Binary(frame.payload.into()))
                        .await
                        .context("send audio frame")?;
                }
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    emit("done", json!({ "frames_heard": frames_heard }));
    Ok(())
}

/// Advancing playlist for the `dj` command: real-time positions, fixed
/// track length, titles the transition loop can chew on.
struct SimulatedPlaylist {
    started: Instant,
    track_secs: f64,
    tracks: u32,
}

impl TrackSource for SimulatedPlaylist {
    fn now_playing(&self) -> Option<TrackSnapshot> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let index = (elapsed / self.track_secs) as u32;
        if index >= self.tracks {
            return None;
        }
        let next = if index + 1 < self.tracks {
            Some(format!("Simulated Song {}", index + 2))
        } else {
            None
        };
        Some(TrackSnapshot {
            title: format!("Simulated Song {}", index + 1),
            artist: "The Placeholders".to_string(),
            position_secs: elapsed % self.track_secs,
            duration_secs: self.track_secs,
            next_track: next,
            playlist: (0..self.tracks)
                .map(|i| format!("Simulated Song {}", i + 1))
                .collect(),
        })
    }
}

async fn run_dj(data_dir: &Path, track_secs: f64, tracks: u32) -> anyhow::Result<()> {
    if track_secs < 50.0 {
        return Err(anyhow!(
            "track_secs must be at least 50 so the generation window can open"
        ));
    }
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;

    let deps = CoreDeps {
        track_source: Arc::new(SimulatedPlaylist {
            started: Instant::now(),
            track_secs,
            tracks,
        }),
        generator: Arc::new(FixtureGenerator),
        voice_backend: Arc::new(LoopbackVoiceBackend),
        audio_output: Arc::new(CountingOutput::default()),
        volume: Arc::new(PrintVolume),
    };
    let app = AircastApp::new(data_dir.to_string_lossy().to_string(), deps);
    app.listen_for_updates(Box::new(JsonUpdates));

    let total = Duration::from_secs_f64(track_secs * f64::from(tracks) + 5.0);
    emit(
        "dj_started",
        json!({ "tracks": tracks, "track_secs": track_secs }),
    );
    tokio::time::sleep(total).await;
    emit("dj_finished", json!({}));
    Ok(())
}
