/// Playback sink collaborator. The core decides *when* everything plays
/// (scheduling, barge-in); the sink just makes sound and reports segment
/// completion.
pub trait AudioOutput: Send + Sync {
    /// Play an encoded DJ segment to completion. `done` must be invoked
    /// exactly once when playback finishes, or immediately if the sink
    /// cannot play it.
    fn play_segment(&self, audio: Vec<u8>, done: Box<dyn FnOnce() + Send>);

    /// Play one PCM chunk of live call audio, starting now.
    fn play_call_chunk(&self, pcm: &[i16], sample_rate: u32);

    /// Cut all currently sounding live call audio (barge-in).
    fn cancel_call_audio(&self);
}
