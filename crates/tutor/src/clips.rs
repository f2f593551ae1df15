use std::time::Duration;

use anyhow::{ensure, Result};
use beatwise_domain::PracticeState;

use crate::config::CycleShape;

/// Playback collaborator that knows how long the backing clip for a
/// practice state runs. One clip spans one cycle.
pub trait ClipLibrary: Send + Sync {
    fn clip_duration(&self, state: &PracticeState) -> Result<Duration>;
}

/// Clip length implied by playing every beat of a cycle at the state's tempo.
#[derive(Debug, Clone, Copy)]
pub struct TempoClips {
    pub shape: CycleShape,
}

impl TempoClips {
    pub fn new(shape: CycleShape) -> Self {
        Self { shape }
    }
}

impl ClipLibrary for TempoClips {
    fn clip_duration(&self, state: &PracticeState) -> Result<Duration> {
        let seconds = self.shape.total_beats() as f64 * state.tempo().seconds_per_beat();
        ensure!(seconds > 0.0, "clip for {} has no length", state.key());
        Ok(Duration::from_secs_f64(seconds))
    }
}

/// Same clip length for every state.
#[derive(Debug, Clone, Copy)]
pub struct FixedClips(pub Duration);

impl ClipLibrary for FixedClips {
    fn clip_duration(&self, _state: &PracticeState) -> Result<Duration> {
        ensure!(!self.0.is_zero(), "clip duration must be positive");
        Ok(self.0)
    }
}
