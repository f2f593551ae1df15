use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::{ScorerKind, SessionConfig};
use crate::TutorError;

/// Timeline positions, in milliseconds from cycle start, that a click is
/// judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTiming {
    pub target_ms: f64,
    /// Timestamp `time_window` beats before the target.
    pub left_boundary_ms: f64,
    pub beat_ms: f64,
}

pub trait ErrorScorer: Send + Sync {
    /// Accuracy of a click against its target; 1.0 is a perfect hit.
    fn score(&self, click_ms: f64, timing: &TargetTiming) -> f64;
}

/// Normal density centred on the target with σ = 1/√(2π), so a perfect hit
/// scores exactly 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianScorer;

impl GaussianScorer {
    pub const SIGMA: f64 = 0.398_942_280_401_432_7;

    pub fn density(click_ms: f64, target_ms: f64) -> f64 {
        let x = click_ms / 1000.0;
        let mu = target_ms / 1000.0;
        let sigma = Self::SIGMA;
        (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp() / (sigma * (2.0 * PI).sqrt())
    }
}

impl ErrorScorer for GaussianScorer {
    fn score(&self, click_ms: f64, timing: &TargetTiming) -> f64 {
        Self::density(click_ms, timing.target_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinearOptions {
    /// Width, in beats, that the distance from the left boundary is divided by.
    pub denominator_beats: f64,
    /// Mirror late clicks to the equivalent early position before scoring.
    pub fold_late_clicks: bool,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            denominator_beats: 3.0,
            fold_late_clicks: true,
        }
    }
}

/// Rises linearly from 0 at the left window boundary to 1 at the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScorer {
    pub options: LinearOptions,
}

impl LinearScorer {
    pub fn new(options: LinearOptions) -> Self {
        Self { options }
    }

    pub fn linear_score(
        &self,
        click_ms: f64,
        target_ms: f64,
        left_boundary_ms: f64,
        beat_ms: f64,
    ) -> f64 {
        let normalized = if self.options.fold_late_clicks && click_ms > target_ms {
            target_ms - (click_ms - target_ms)
        } else {
            click_ms
        };
        (normalized - left_boundary_ms) / (self.options.denominator_beats * beat_ms)
    }
}

impl ErrorScorer for LinearScorer {
    fn score(&self, click_ms: f64, timing: &TargetTiming) -> f64 {
        self.linear_score(
            click_ms,
            timing.target_ms,
            timing.left_boundary_ms,
            timing.beat_ms,
        )
    }
}

/// What to do with a score outside [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    #[default]
    Reject,
    Clamp,
    Keep,
}

impl OutOfRangePolicy {
    pub fn apply(self, value: f64) -> Result<f64, TutorError> {
        if (0.0..=1.0).contains(&value) {
            return Ok(value);
        }
        match self {
            Self::Reject => Err(TutorError::ScoringOutOfRange { value }),
            Self::Clamp if value.is_nan() => Err(TutorError::ScoringOutOfRange { value }),
            Self::Clamp => Ok(value.clamp(0.0, 1.0)),
            Self::Keep => Ok(value),
        }
    }
}

pub fn scorer_for(config: &SessionConfig) -> Box<dyn ErrorScorer> {
    match config.scorer {
        ScorerKind::Linear => Box::new(LinearScorer::new(config.linear)),
        ScorerKind::Gaussian => Box::new(GaussianScorer),
    }
}
