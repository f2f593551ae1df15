use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tempo {
    /// Single-character id used as the final character of a state key.
    pub id: char,
    pub name: String,
    /// Beats per minute.
    pub bpm: f32,
}

impl Tempo {
    pub fn new(id: char, name: impl Into<String>, bpm: f32) -> Result<Self, DomainError> {
        if !id.is_ascii_alphanumeric() {
            return Err(DomainError::configuration(format!(
                "tempo id {id:?} must be an ascii letter or digit"
            )));
        }
        if !(10.0..=400.0).contains(&bpm) {
            return Err(DomainError::configuration(
                "tempo bpm must be between 10 and 400",
            ));
        }
        Ok(Self {
            id,
            name: name.into(),
            bpm,
        })
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bpm)", self.name, self.bpm)
    }
}

/// Tempos ordered from slowest to fastest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TempoScale {
    tempos: Vec<Tempo>,
}

impl TempoScale {
    pub fn new(tempos: Vec<Tempo>) -> Result<Self, DomainError> {
        if tempos.is_empty() {
            return Err(DomainError::configuration(
                "tempo scale requires at least one tempo",
            ));
        }
        let mut sorted = tempos;
        sorted.sort_by(|a, b| a.bpm.total_cmp(&b.bpm));
        for pair in sorted.windows(2) {
            if pair[0].bpm == pair[1].bpm {
                return Err(DomainError::configuration(format!(
                    "tempos {:?} and {:?} share {} bpm",
                    pair[0].id, pair[1].id, pair[0].bpm
                )));
            }
        }
        for (index, tempo) in sorted.iter().enumerate() {
            if sorted[index + 1..].iter().any(|other| other.id == tempo.id) {
                return Err(DomainError::configuration(format!(
                    "duplicate tempo id {:?}",
                    tempo.id
                )));
            }
        }
        Ok(Self { tempos: sorted })
    }

    pub fn tempos(&self) -> &[Tempo] {
        &self.tempos
    }

    pub fn len(&self) -> usize {
        self.tempos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tempos.is_empty()
    }

    pub fn get(&self, id: char) -> Option<&Tempo> {
        self.tempos.iter().find(|tempo| tempo.id == id)
    }

    /// Position in the slow-to-fast ordering.
    pub fn rank(&self, id: char) -> Option<usize> {
        self.tempos.iter().position(|tempo| tempo.id == id)
    }

    pub fn slowest(&self) -> &Tempo {
        &self.tempos[0]
    }

    pub fn fastest(&self) -> &Tempo {
        &self.tempos[self.tempos.len() - 1]
    }

    pub fn slower(&self, id: char) -> Option<&Tempo> {
        let rank = self.rank(id)?;
        rank.checked_sub(1).map(|below| &self.tempos[below])
    }

    pub fn faster(&self, id: char) -> Option<&Tempo> {
        let rank = self.rank(id)?;
        self.tempos.get(rank + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> TempoScale {
        TempoScale::new(vec![
            Tempo::new('F', "Fast", 120.0).unwrap(),
            Tempo::new('S', "Slow", 80.0).unwrap(),
            Tempo::new('M', "Medium", 100.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn tempo_validation() {
        assert!(Tempo::new('S', "Slow", 5.0).is_err());
        assert!(Tempo::new('-', "Slow", 80.0).is_err());
        assert!(Tempo::new('S', "Slow", 80.0).is_ok());
    }

    #[test]
    fn scale_orders_slow_to_fast() {
        let scale = scale();
        let ids: Vec<char> = scale.tempos().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!['S', 'M', 'F']);
        assert_eq!(scale.slowest().id, 'S');
        assert_eq!(scale.fastest().id, 'F');
        assert_eq!(scale.rank('M'), Some(1));
    }

    #[test]
    fn neighbours_in_ordering() {
        let scale = scale();
        assert!(scale.slower('S').is_none());
        assert_eq!(scale.faster('S').unwrap().id, 'M');
        assert_eq!(scale.slower('F').unwrap().id, 'M');
        assert!(scale.faster('F').is_none());
    }

    #[test]
    fn scale_rejects_empty_and_duplicates() {
        assert!(TempoScale::new(Vec::new()).is_err());
        assert!(TempoScale::new(vec![
            Tempo::new('S', "Slow", 80.0).unwrap(),
            Tempo::new('S', "Other", 90.0).unwrap(),
        ])
        .is_err());
        assert!(TempoScale::new(vec![
            Tempo::new('S', "Slow", 80.0).unwrap(),
            Tempo::new('T', "Also slow", 80.0).unwrap(),
        ])
        .is_err());
    }
}
