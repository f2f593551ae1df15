use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Largest id that still renders as a single base-36 key character.
pub const MAX_INSTRUMENT_ID: u8 = 35;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instrument {
    pub id: u8,
    pub name: String,
}

impl Instrument {
    pub fn new(id: u8, name: impl Into<String>) -> Result<Self, DomainError> {
        if id > MAX_INSTRUMENT_ID {
            return Err(DomainError::configuration(format!(
                "instrument id {id} exceeds {MAX_INSTRUMENT_ID}"
            )));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::configuration("instrument name cannot be empty"));
        }
        Ok(Self { id, name })
    }

    /// Single character used for this instrument inside a canonical state key.
    pub fn key_char(&self) -> char {
        id_to_char(self.id)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub(crate) fn id_to_char(id: u8) -> char {
    char::from_digit(id as u32, 36).unwrap_or('?')
}

pub(crate) fn char_to_id(c: char) -> Option<u8> {
    c.to_digit(36).map(|digit| digit as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_validation() {
        assert!(Instrument::new(36, "Theremin").is_err());
        assert!(Instrument::new(2, "  ").is_err());
        assert!(Instrument::new(2, "Bass").is_ok());
    }

    #[test]
    fn key_chars_are_base36() {
        assert_eq!(Instrument::new(3, "Guitar").unwrap().key_char(), '3');
        assert_eq!(Instrument::new(11, "Cello").unwrap().key_char(), 'b');
        assert_eq!(char_to_id('b'), Some(11));
        assert_eq!(char_to_id('B'), Some(11));
        assert_eq!(char_to_id('-'), None);
    }
}
