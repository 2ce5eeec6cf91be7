use std::collections::VecDeque;

/// Bounded queue for caller audio between the relay leg and the voice
/// pipeline. Overflow drops the oldest frames (fresh audio wins on a live
/// call); playout holds back until a small prefill is buffered so a bursty
/// network start does not stutter.
#[derive(Debug, Clone)]
pub struct PlayoutBuffer<T> {
    capacity: usize,
    prefill: usize,
    frames: VecDeque<T>,
    draining: bool,
    dropped: u64,
    underruns: u64,
}

impl<T> PlayoutBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_prefill(capacity, 1)
    }

    pub fn with_prefill(capacity: usize, prefill: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            prefill: prefill.clamp(1, capacity),
            frames: VecDeque::new(),
            draining: false,
            dropped: 0,
            underruns: 0,
        }
    }

    /// Returns true when the push evicted older audio.
    pub fn push(&mut self, frame: T) -> bool {
        self.frames.push_back(frame);
        let mut evicted = false;
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
            evicted = true;
        }
        evicted
    }

    /// Next frame to play, or None while the prefill target is not met.
    /// Running dry re-arms the prefill gate and counts an underrun.
    pub fn next_frame(&mut self) -> Option<T> {
        if !self.draining {
            if self.frames.len() < self.prefill {
                return None;
            }
            self.draining = true;
        }
        match self.frames.pop_front() {
            Some(frame) => Some(frame),
            None => {
                self.draining = false;
                self.underruns = self.underruns.saturating_add(1);
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.draining = false;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let mut buf = PlayoutBuffer::new(2);
        assert!(!buf.push(1));
        assert!(!buf.push(2));
        assert!(buf.push(3));
        assert_eq!(buf.dropped(), 1);
        assert_eq!(buf.next_frame(), Some(2));
        assert_eq!(buf.next_frame(), Some(3));
    }

    #[test]
    fn playout_waits_for_prefill() {
        let mut buf = PlayoutBuffer::with_prefill(4, 2);
        buf.push(10);
        assert_eq!(buf.next_frame(), None);
        buf.push(11);
        assert_eq!(buf.next_frame(), Some(10));
        assert_eq!(buf.next_frame(), Some(11));
    }

    #[test]
    fn underrun_rearms_prefill_gate() {
        let mut buf = PlayoutBuffer::with_prefill(4, 2);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.next_frame(), Some(1));
        assert_eq!(buf.next_frame(), Some(2));
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.underruns(), 1);

        buf.push(3);
        assert_eq!(buf.next_frame(), None);
        buf.push(4);
        assert_eq!(buf.next_frame(), Some(3));
    }

    #[test]
    fn clear_resets_drain_state_but_keeps_counters() {
        let mut buf = PlayoutBuffer::with_prefill(4, 1);
        buf.push(1);
        assert_eq!(buf.next_frame(), Some(1));
        buf.clear();
        assert!(buf.is_empty());
        buf.push(9);
        assert_eq!(buf.next_frame(), Some(9));
    }
}
