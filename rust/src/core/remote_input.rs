use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use aircast_media::frame::{AudioFrame, FRAME_MS, FRAME_SAMPLES, SAMPLE_RATE};
use aircast_media::playout::PlayoutBuffer;
use aircast_media::protocol::ControlMessage;

use super::live_session::SessionEvents;

/// Caller-audio source for a live call session. A local microphone and the
/// relay adapter expose the same contract, so the session manager cannot
/// tell them apart.
pub trait CallInput: Send {
    fn start(
        &mut self,
        runtime: &tokio::runtime::Handle,
        events: SessionEvents,
    ) -> Result<(), String>;

    /// Stop producing frames. Must be idempotent.
    fn stop(&mut self);

    /// Return leg back to the caller, when the source has one (the relay
    /// adapter does; a microphone obviously does not).
    fn guest_audio(&self) -> Option<GuestAudioSender> {
        None
    }
}

/// Handle for pushing host-side audio back to a paired caller.
#[derive(Clone)]
pub struct GuestAudioSender {
    tx: mpsc::UnboundedSender<AudioFrame>,
}

impl GuestAudioSender {
    pub fn send(&self, frame: AudioFrame) {
        let _ = self.tx.send(frame);
    }
}

/// Deterministic 220 Hz tone source on a worker thread. No devices, no
/// network; the frame cadence matches a real capture source.
pub struct SyntheticInput {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SyntheticInput {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for SyntheticInput {
    fn default() -> Self {
        Self::new()
    }
}

impl CallInput for SyntheticInput {
    fn start(
        &mut self,
        _runtime: &tokio::runtime::Handle,
        events: SessionEvents,
    ) -> Result<(), String> {
        if self.worker.is_some() {
            return Err("input already started".to_string());
        }
        let stop = self.stop.clone();
        let worker = thread::spawn(move || {
            let mut phase = 0.0f32;
            let mut seq = 0u64;
            let step = (2.0 * std::f32::consts::PI * 220.0) / SAMPLE_RATE as f32;
            while !stop.load(Ordering::Relaxed) {
                let mut pcm = Vec::with_capacity(FRAME_SAMPLES);
                for _ in 0..FRAME_SAMPLES {
                    pcm.push((phase.sin() * (i16::MAX as f32 * 0.15)) as i16);
                    phase += step;
                    if phase > 2.0 * std::f32::consts::PI {
                        phase -= 2.0 * std::f32::consts::PI;
                    }
                }
                events.input_frame(AudioFrame::from_pcm(seq, &pcm));
                seq = seq.saturating_add(1);
                thread::sleep(Duration::from_millis(u64::from(FRAME_MS)));
            }
        });
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The relay adapter: registers this host's pairing code on the relay and
/// turns the paired caller's binary frames into the same `AudioFrame`
/// events a local capture source would produce. Relay control frames
/// surface as status updates, never as audio.
pub struct RemoteCallerInput {
    relay_url: String,
    host_id: String,
    stop: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    guest_tx: mpsc::UnboundedSender<AudioFrame>,
    guest_rx: Option<mpsc::UnboundedReceiver<AudioFrame>>,
}

impl RemoteCallerInput {
    pub fn new(relay_url: String, host_id: String) -> Self {
        let (guest_tx, guest_rx) = mpsc::unbounded_channel();
        Self {
            relay_url,
            host_id,
            stop: Arc::new(AtomicBool::new(false)),
            task: None,
            guest_tx,
            guest_rx: Some(guest_rx),
        }
    }
}

impl CallInput for RemoteCallerInput {
    fn start(
        &mut self,
        runtime: &tokio::runtime::Handle,
        events: SessionEvents,
    ) -> Result<(), String> {
        let guest_rx = self
            .guest_rx
            .take()
            .ok_or_else(|| "input already started".to_string())?;
        let url = self.relay_url.clone();
        let host_id = self.host_id.clone();
        let stop = self.stop.clone();
        self.task = Some(runtime.spawn(run_relay_link(url, host_id, guest_rx, events, stop)));
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn guest_audio(&self) -> Option<GuestAudioSender> {
        Some(GuestAudioSender {
            tx: self.guest_tx.clone(),
        })
    }
}

async fn run_relay_link(
    url: String,
    host_id: String,
    mut guest_rx: mpsc::UnboundedReceiver<AudioFrame>,
    events: SessionEvents,
    stop: Arc<AtomicBool>,
) {
    let (ws, _) = match tokio_tungstenite::connect_async(&url).await {
        Ok(conn) => conn,
        Err(err) => {
            events.input_failed(format!("relay connect failed: {err}"));
            return;
        }
    };
    let (mut sink, mut reader) = ws.split();

    let register = ControlMessage::RegisterHost {
        host_id: host_id.clone(),
    };
    let encoded = match register.encode() {
        Ok(json) => json,
        Err(err) => {
            events.input_failed(format!("encode register: {err}"));
            return;
        }
    };
    if sink.send(Message::Text(encoded.into())).await.is_err() {
        events.input_failed("relay rejected registration".to_string());
        return;
    }
    info!(host_id = %host_id, "pairing code registered on relay");

    // Small elastic buffer between network arrival and the 20ms frame pump,
    // so a bursty guest uplink neither floods the session nor stutters.
    let mut inbound = PlayoutBuffer::<Vec<u8>>::with_prefill(8, 2);
    let mut guest_attached = false;
    let mut seq = 0u64;
    let mut pump = tokio::time::interval(Duration::from_millis(u64::from(FRAME_MS)));

    loop {
        if stop.load(Ordering::Relaxed) {
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        tokio::select! {
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    if inbound.push(data.to_vec()) {
                        debug!("guest uplink overflow, dropped oldest frame");
                    }
                }
                Some(Ok(Message::Text(text))) => match ControlMessage::parse(text.as_str()) {
                    Ok(ControlMessage::GuestConnected { caller_name }) => {
                        guest_attached = true;
                        events.caller_joined(caller_name);
                    }
                    Ok(ControlMessage::GuestDisconnected) => {
                        guest_attached = false;
                        inbound.clear();
                        events.caller_left();
                    }
                    Ok(ControlMessage::Error { message }) => {
                        events.input_failed(format!("relay error: {message}"));
                        return;
                    }
                    Ok(other) => debug!(tag = other.tag(), "unexpected relay message"),
                    Err(err) => debug!(err = %err, "unparseable relay message ignored"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    if !stop.load(Ordering::Relaxed) {
                        events.input_failed("relay connection closed".to_string());
                    }
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    events.input_failed(format!("relay stream error: {err}"));
                    return;
                }
            },
            outgoing = guest_rx.recv() => {
                if let Some(frame) = outgoing {
                    // Without a paired guest there is nowhere to deliver;
                    // sending would only earn relay protocol errors.
                    if guest_attached
                        && sink.send(Message::Binary(frame.payload.into())).await.is_err()
                    {
                        events.input_failed("relay send failed".to_string());
                        return;
                    }
                }
            }
            _ = pump.tick() => {
                if let Some(payload) = inbound.next_frame() {
                    events.input_frame(AudioFrame {
                        seq,
                        timestamp_us: seq.saturating_mul(u64::from(FRAME_MS) * 1_000),
                        payload,
                    });
                    seq = seq.saturating_add(1);
                }
            }
        }
    }
}

/// Local capture device via cpal, downmixed to mono i16 frames. The stream
/// lives on its own thread because cpal streams are not Send.
#[cfg(feature = "microphone")]
pub struct MicrophoneInput {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

#[cfg(feature = "microphone")]
impl MicrophoneInput {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

#[cfg(feature = "microphone")]
impl Default for MicrophoneInput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "microphone")]
impl CallInput for MicrophoneInput {
    fn start(
        &mut self,
        _runtime: &tokio::runtime::Handle,
        events: SessionEvents,
    ) -> Result<(), String> {
        if self.worker.is_some() {
            return Err("input already started".to_string());
        }
        let stop = self.stop.clone();
        let worker = thread::spawn(move || {
            use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
            use std::collections::VecDeque;
            use std::sync::Mutex;

            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                events.input_failed("no input audio device available".to_string());
                return;
            };
            let config = match device.default_input_config() {
                Ok(cfg) => cfg,
                Err(err) => {
                    events.input_failed(format!("input config error: {err}"));
                    return;
                }
            };
            let channels = config.channels() as usize;
            let captured: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
            let captured_cb = captured.clone();
            let stream = match config.sample_format() {
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &config.config(),
                    move |data: &[i16], _| {
                        let mut queue = captured_cb.lock().expect("capture queue poisoned");
                        for frame in data.chunks(channels.max(1)) {
                            if let Some(sample) = frame.first() {
                                queue.push_back(*sample);
                            }
                        }
                    },
                    |_| {},
                    None,
                ),
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &config.config(),
                    move |data: &[f32], _| {
                        let mut queue = captured_cb.lock().expect("capture queue poisoned");
                        for frame in data.chunks(channels.max(1)) {
                            if let Some(sample) = frame.first() {
                                let clamped = sample.clamp(-1.0, 1.0);
                                queue.push_back((clamped * i16::MAX as f32) as i16);
                            }
                        }
                    },
                    |_| {},
                    None,
                ),
                other => {
                    events.input_failed(format!("unsupported input sample format: {other:?}"));
                    return;
                }
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    events.input_failed(format!("build input stream failed: {err}"));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                events.input_failed(format!("start input stream failed: {err}"));
                return;
            }

            let mut seq = 0u64;
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(u64::from(FRAME_MS)));
                let mut pcm = vec![0i16; FRAME_SAMPLES];
                {
                    let mut queue = captured.lock().expect("capture queue poisoned");
                    for sample in pcm.iter_mut() {
                        match queue.pop_front() {
                            Some(v) => *sample = v,
                            None => break,
                        }
                    }
                }
                events.input_frame(AudioFrame::from_pcm(seq, &pcm));
                seq = seq.saturating_add(1);
            }
        });
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
