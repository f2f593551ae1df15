pub mod catalog;
pub mod error;
pub mod instrument;
pub mod io;
pub mod key;
pub mod space;
pub mod state;
pub mod tempo;

pub use crate::catalog::{Catalog, MAX_CATALOG_INSTRUMENTS};
pub use crate::error::DomainError;
pub use crate::instrument::Instrument;
pub use crate::io::{ExportFormat, ProfileExporter, SnapshotExporter};
pub use crate::key::StateKey;
pub use crate::space::{PracticeStateSpace, ProfileSnapshot, StateSnapshot};
pub use crate::state::{Neighbors, PracticeState};
pub use crate::tempo::{Tempo, TempoScale};
