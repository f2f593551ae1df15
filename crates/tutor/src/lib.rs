pub mod analytics;
pub mod clips;
pub mod config;
pub mod error;
pub mod events;
pub mod policy;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod timeline;
pub mod windows;

pub use analytics::{EndReason, SessionSummary, VisitReport};
pub use clips::{ClipLibrary, FixedClips, TempoClips};
pub use config::{CycleShape, ScorerKind, SessionConfig, TrainerConfig};
pub use error::TutorError;
pub use events::SessionEvent;
pub use policy::{ClassificationRules, DifficultyPolicy, PolicyVariant};
pub use scheduler::{BeatScheduler, Clicker};
pub use scoring::{ErrorScorer, GaussianScorer, LinearOptions, LinearScorer, OutOfRangePolicy};
pub use session::{ClickOutcome, SessionContext};
pub use windows::{ActiveWindow, SlotId, WindowSlots};
