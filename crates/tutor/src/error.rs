use beatwise_domain::{DomainError, StateKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no neighbor of {key} is eligible for selection")]
    NoCandidate { key: StateKey },
    #[error("score {value} falls outside the scoring window")]
    ScoringOutOfRange { value: f64 },
    #[error("window tracker corrupted while closing bar {bar}: both slots are unopened")]
    TrackerCorruption { bar: usize },
    #[error("session has already ended")]
    SessionAlreadyEnded,
    #[error("session lock poisoned")]
    LockPoisoned,
    #[error("clip library failed: {0}")]
    Clip(String),
    #[error("session driver failed: {0}")]
    DriverFailed(String),
}

impl TutorError {
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Errors after which the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TrackerCorruption { .. }
                | Self::NoCandidate { .. }
                | Self::LockPoisoned
                | Self::DriverFailed(_)
                | Self::Domain(_)
        )
    }
}
