use std::fmt::{Display, Formatter};

pub const SAMPLE_RATE: u32 = 48_000;
pub const FRAME_MS: u32 = 20;
pub const FRAME_SAMPLES: usize = 960; // 20ms @ 48kHz mono.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    EmptyFrame,
    OddPayloadLength(usize),
}

impl Display for MediaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFrame => write!(f, "audio frame payload is empty"),
            Self::OddPayloadLength(len) => {
                write!(f, "audio frame payload has odd byte length {len}")
            }
        }
    }
}

impl std::error::Error for MediaError {}

/// One leg of live audio on the wire: raw little-endian i16 PCM samples.
/// The relay treats the payload as opaque bytes; only the endpoints frame
/// and unframe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub seq: u64,
    pub timestamp_us: u64,
    pub payload: Vec<u8>,
}

impl AudioFrame {
    pub fn from_pcm(seq: u64, pcm: &[i16]) -> Self {
        Self {
            seq,
            timestamp_us: seq.saturating_mul(u64::from(FRAME_MS) * 1_000),
            payload: encode_pcm_i16(pcm),
        }
    }

    pub fn pcm(&self) -> Result<Vec<i16>, MediaError> {
        decode_pcm_i16(&self.payload)
    }

    /// Playback duration of this frame at the given sample rate, in
    /// microseconds. Mono samples assumed.
    pub fn duration_us(&self, sample_rate: u32) -> u64 {
        let samples = (self.payload.len() / 2) as u64;
        samples.saturating_mul(1_000_000) / u64::from(sample_rate.max(1))
    }
}

pub fn encode_pcm_i16(pcm: &[i16]) -> Vec<u8> {
    pcm.iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect::<Vec<u8>>()
}

pub fn decode_pcm_i16(payload: &[u8]) -> Result<Vec<i16>, MediaError> {
    if payload.is_empty() {
        return Err(MediaError::EmptyFrame);
    }
    if payload.len() % 2 != 0 {
        return Err(MediaError::OddPayloadLength(payload.len()));
    }
    Ok(payload
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}
