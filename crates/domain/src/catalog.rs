use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{instrument::MAX_INSTRUMENT_ID, DomainError, Instrument, Tempo, TempoScale};

/// Largest instrument enumeration a practice space is built for. The space
/// grows as `2^n - 1` states per tempo.
pub const MAX_CATALOG_INSTRUMENTS: usize = 16;

/// The instrument and tempo enumerations a practice space is built from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub instruments: Vec<Instrument>,
    pub tempos: Vec<Tempo>,
}

impl Catalog {
    pub fn new(instruments: Vec<Instrument>, tempos: Vec<Tempo>) -> Result<Self, DomainError> {
        let catalog = Self {
            instruments,
            tempos,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.instruments.is_empty() {
            return Err(DomainError::configuration(
                "catalog requires at least one instrument",
            ));
        }
        if self.instruments.len() > MAX_CATALOG_INSTRUMENTS {
            return Err(DomainError::configuration(format!(
                "catalog lists {} instruments, at most {MAX_CATALOG_INSTRUMENTS} are supported",
                self.instruments.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for instrument in &self.instruments {
            if instrument.id > MAX_INSTRUMENT_ID {
                return Err(DomainError::configuration(format!(
                    "instrument id {} exceeds {MAX_INSTRUMENT_ID}",
                    instrument.id
                )));
            }
            if !seen.insert(instrument.id) {
                return Err(DomainError::configuration(format!(
                    "duplicate instrument id {}",
                    instrument.id
                )));
            }
        }
        for tempo in &self.tempos {
            Tempo::new(tempo.id, tempo.name.clone(), tempo.bpm)?;
        }
        TempoScale::new(self.tempos.clone())?;
        Ok(())
    }

    pub fn instrument(&self, id: u8) -> Option<&Instrument> {
        self.instruments.iter().find(|instrument| instrument.id == id)
    }

    pub fn tempo_scale(&self) -> Result<TempoScale, DomainError> {
        TempoScale::new(self.tempos.clone())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let instrument = |id: u8, name: &str| Instrument {
            id,
            name: name.to_string(),
        };
        let tempo = |id: char, name: &str, bpm: f32| Tempo {
            id,
            name: name.to_string(),
            bpm,
        };
        Self {
            instruments: vec![
                instrument(1, "Drums"),
                instrument(2, "Bass"),
                instrument(3, "Guitar"),
                instrument(4, "Piano"),
            ],
            tempos: vec![
                tempo('S', "Slow", 80.0),
                tempo('M', "Medium", 100.0),
                tempo('F', "Fast", 120.0),
            ],
        }
    }
}
