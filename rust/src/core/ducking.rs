use std::sync::Arc;

use tracing::debug;

/// Playback-volume collaborator (the host page's media element, a mixer, a
/// test recorder). Level is linear 0.0..=1.0.
pub trait VolumeControl: Send + Sync {
    fn set_volume(&self, level: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuckOwner {
    DjSegment,
    LiveCall,
}

/// The single shared ducking resource. Both the DJ loop and the live call
/// duck through here; ownership is last-writer-wins, not mutually
/// exclusive: a later `duck` takes the resource over, and `release` only
/// restores volume if the releasing owner still holds it.
pub(super) struct Ducker {
    target: Arc<dyn VolumeControl>,
    base: f32,
    ducked: f32,
    holder: Option<DuckOwner>,
}

impl Ducker {
    pub(super) fn new(target: Arc<dyn VolumeControl>, base: f32, ducked: f32) -> Self {
        Self {
            target,
            base,
            ducked,
            holder: None,
        }
    }

    pub(super) fn duck(&mut self, owner: DuckOwner) {
        if self.holder != Some(owner) {
            debug!(?owner, prev = ?self.holder, "ducking media volume");
        }
        self.holder = Some(owner);
        self.target.set_volume(self.ducked);
    }

    pub(super) fn release(&mut self, owner: DuckOwner) {
        if self.holder != Some(owner) {
            // A later writer took the duck over; their release restores it.
            return;
        }
        self.holder = None;
        self.target.set_volume(self.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingVolume {
        levels: Mutex<Vec<f32>>,
    }

    impl VolumeControl for RecordingVolume {
        fn set_volume(&self, level: f32) {
            self.levels.lock().unwrap().push(level);
        }
    }

    #[test]
    fn duck_and_release_restores_base_volume() {
        let vol = Arc::new(RecordingVolume::default());
        let mut ducker = Ducker::new(vol.clone(), 1.0, 0.2);
        ducker.duck(DuckOwner::DjSegment);
        ducker.release(DuckOwner::DjSegment);
        assert_eq!(*vol.levels.lock().unwrap(), vec![0.2, 1.0]);
    }

    #[test]
    fn stale_owner_release_is_a_no_op() {
        let vol = Arc::new(RecordingVolume::default());
        let mut ducker = Ducker::new(vol.clone(), 1.0, 0.2);
        ducker.duck(DuckOwner::DjSegment);
        // The live call takes the duck over mid-segment.
        ducker.duck(DuckOwner::LiveCall);
        // The DJ segment finishing must not restore volume under the call.
        ducker.release(DuckOwner::DjSegment);
        assert_eq!(*vol.levels.lock().unwrap(), vec![0.2, 0.2]);
        ducker.release(DuckOwner::LiveCall);
        assert_eq!(vol.levels.lock().unwrap().last(), Some(&1.0));
    }
}
