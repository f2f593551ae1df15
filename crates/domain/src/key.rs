use std::fmt;

use serde::{Deserialize, Serialize};

use crate::instrument::{char_to_id, id_to_char};
use crate::{Catalog, DomainError};

/// Canonical identity of a practice state: ascending instrument key
/// characters followed by the tempo id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn render(instrument_ids: &[u8], tempo_id: char) -> Self {
        let mut ids = instrument_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut key: String = ids.into_iter().map(id_to_char).collect();
        key.push(tempo_id);
        Self(key)
    }

    /// Splits a key back into instrument ids and tempo id, checking both
    /// against the catalog.
    pub fn parse(raw: &str, catalog: &Catalog) -> Result<(Vec<u8>, char), DomainError> {
        let chars: Vec<char> = raw.chars().collect();
        let Some((&tempo_id, instrument_chars)) = chars.split_last() else {
            return Err(DomainError::malformed_key(raw, "empty key"));
        };
        if instrument_chars.is_empty() {
            return Err(DomainError::malformed_key(raw, "no instruments"));
        }
        if !catalog.tempos.iter().any(|tempo| tempo.id == tempo_id) {
            return Err(DomainError::malformed_key(
                raw,
                format!("unknown tempo {tempo_id:?}"),
            ));
        }
        let mut ids = Vec::with_capacity(instrument_chars.len());
        for &c in instrument_chars {
            let id = char_to_id(c)
                .filter(|id| catalog.instrument(*id).is_some())
                .ok_or_else(|| {
                    DomainError::malformed_key(raw, format!("unknown instrument {c:?}"))
                })?;
            if let Some(&previous) = ids.last() {
                if id <= previous {
                    return Err(DomainError::malformed_key(
                        raw,
                        "instruments must be strictly ascending",
                    ));
                }
            }
            ids.push(id);
        }
        Ok((ids, tempo_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_sorts_instruments() {
        assert_eq!(StateKey::render(&[3, 1], 'S').as_str(), "13S");
        assert_eq!(StateKey::render(&[4], 'F').as_str(), "4F");
    }

    #[test]
    fn parse_decomposes_key() {
        let catalog = Catalog::default();
        assert_eq!(StateKey::parse("124M", &catalog).unwrap(), (vec![1, 2, 4], 'M'));
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        let catalog = Catalog::default();
        for raw in ["", "S", "19S", "12X", "21S", "11S"] {
            assert!(
                matches!(
                    StateKey::parse(raw, &catalog),
                    Err(DomainError::MalformedKey { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }
}
