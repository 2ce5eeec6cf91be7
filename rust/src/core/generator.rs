use std::f32::consts::TAU;
use std::time::Duration;

use serde::Serialize;

use aircast_media::frame::encode_pcm_i16;

/// Everything the script/voice generator needs to write and speak one
/// transition segment.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRequest {
    pub current_track: String,
    pub next_track: Option<String>,
    pub playlist_context: Vec<String>,
    pub style: String,
    pub voice: String,
    pub language: String,
}

/// Synthesized segment, opaque encoded audio bytes. The playback sink is
/// responsible for decoding whatever container the backend produced.
#[derive(Debug, Clone)]
pub struct SegmentAudio {
    pub audio: Vec<u8>,
}

/// The content-generation backend. Blocking; the core always calls it from
/// a spawned worker, never from the tick loop. An `Err` is a soft failure
/// (backend declined, quota, network) and sends the scheduler to cooldown.
pub trait SegmentGenerator: Send + Sync {
    fn generate(&self, request: &SegmentRequest) -> Result<SegmentAudio, String>;
}

/// Deterministic offline generator: a short 440 Hz tone. Used by tests and
/// the cli `dj` command so the whole loop runs without credentials.
#[derive(Debug, Default)]
pub struct FixtureGenerator;

impl SegmentGenerator for FixtureGenerator {
    fn generate(&self, _request: &SegmentRequest) -> Result<SegmentAudio, String> {
        Ok(SegmentAudio {
            audio: encode_pcm_i16(&fixture_tone_pcm(24_000, 650)),
        })
    }
}

pub fn fixture_tone_pcm(sample_rate_hz: u32, duration_ms: u32) -> Vec<i16> {
    let sample_count = (sample_rate_hz as usize * duration_ms as usize) / 1000;
    let step = TAU * 440.0f32 / sample_rate_hz as f32;
    let mut phase = 0f32;
    let mut pcm = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        pcm.push((phase.sin() * (i16::MAX as f32 * 0.2f32)) as i16);
        phase += step;
        if phase > TAU {
            phase -= TAU;
        }
    }
    pcm
}

/// Production adapter: POSTs the request to an OpenAI-style speech endpoint
/// and returns the response body bytes as the segment audio.
/// Configured from env: `AIRCAST_DJ_API_URL`, `AIRCAST_DJ_API_KEY`;
/// `AIRCAST_DJ_FIXTURE=1` short-circuits to the fixture tone.
#[derive(Debug, Clone)]
pub struct HttpSegmentGenerator {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpSegmentGenerator {
    pub fn from_env() -> Result<Self, String> {
        let base_url = std::env::var("AIRCAST_DJ_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| "generator not configured: set AIRCAST_DJ_API_URL".to_string())?;
        let api_key = std::env::var("AIRCAST_DJ_API_KEY").unwrap_or_default();
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("build generator client: {e}"))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

impl SegmentGenerator for HttpSegmentGenerator {
    fn generate(&self, request: &SegmentRequest) -> Result<SegmentAudio, String> {
        if fixture_mode() {
            return FixtureGenerator.generate(request);
        }
        let url = format!("{}/segments", self.base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(request);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .map_err(|e| format!("segment request failed: {e}"))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .map_err(|e| format!("read segment response: {e}"))?;
        if !status.is_success() {
            return Err(format!(
                "generator declined status={} body={}",
                status,
                String::from_utf8_lossy(&bytes).chars().take(240).collect::<String>()
            ));
        }
        if bytes.is_empty() {
            // Absence of audio is a decline, not a crash.
            return Err("generator returned no audio".to_string());
        }
        Ok(SegmentAudio {
            audio: bytes.to_vec(),
        })
    }
}

fn fixture_mode() -> bool {
    std::env::var("AIRCAST_DJ_FIXTURE")
        .ok()
        .as_deref()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
