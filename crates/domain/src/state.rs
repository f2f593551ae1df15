use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{StateKey, Tempo};

/// Lateral links from one practice state to others in the same space,
/// grouped by how they differ.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Neighbors {
    /// Same instruments, adjacent tempo.
    pub tempo: Vec<StateKey>,
    /// Same tempo, one more instrument.
    pub add_one: Vec<StateKey>,
    /// Same tempo, one fewer instrument.
    pub remove_one: Vec<StateKey>,
    /// Same tempo, one instrument substituted.
    pub swap_one: Vec<StateKey>,
}

impl Neighbors {
    /// Every neighbor once, in category order.
    pub fn all(&self) -> Vec<&StateKey> {
        let mut seen = BTreeSet::new();
        self.tempo
            .iter()
            .chain(&self.add_one)
            .chain(&self.remove_one)
            .chain(&self.swap_one)
            .filter(|key| seen.insert(*key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tempo.is_empty()
            && self.add_one.is_empty()
            && self.remove_one.is_empty()
            && self.swap_one.is_empty()
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.all().contains(&key)
    }
}

/// One instrument combination at one tempo, with the accuracy history
/// gathered while practising it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PracticeState {
    key: StateKey,
    instruments: Vec<u8>,
    tempo: Tempo,
    tempo_rank: usize,
    neighbors: Neighbors,
    explored: bool,
    #[serde(skip)]
    raw_samples: Vec<f64>,
    visit_averages: Vec<f64>,
    score: f64,
}

impl PracticeState {
    pub(crate) fn new(instruments: Vec<u8>, tempo: Tempo, tempo_rank: usize) -> Self {
        let key = StateKey::render(&instruments, tempo.id);
        let mut instruments = instruments;
        instruments.sort_unstable();
        Self {
            key,
            instruments,
            tempo,
            tempo_rank,
            neighbors: Neighbors::default(),
            explored: false,
            raw_samples: Vec::new(),
            visit_averages: Vec::new(),
            score: 0.0,
        }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Instrument ids in ascending order.
    pub fn instruments(&self) -> &[u8] {
        &self.instruments
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    pub fn tempo(&self) -> &Tempo {
        &self.tempo
    }

    pub fn bpm(&self) -> f32 {
        self.tempo.bpm
    }

    /// Position of this state's tempo in the slow-to-fast ordering.
    pub fn tempo_rank(&self) -> usize {
        self.tempo_rank
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    pub(crate) fn set_neighbors(&mut self, neighbors: Neighbors) {
        self.neighbors = neighbors;
    }

    pub fn record_sample(&mut self, value: f64) {
        self.raw_samples.push(value);
    }

    pub fn pending_samples(&self) -> &[f64] {
        &self.raw_samples
    }

    /// Folds the samples of the current visit into the history. Returns the
    /// visit average, or `None` when nothing was recorded.
    pub fn aggregate(&mut self) -> Option<f64> {
        if self.raw_samples.is_empty() {
            return None;
        }
        let visit_average = mean(&self.raw_samples);
        self.raw_samples.clear();
        self.visit_averages.push(visit_average);
        self.score = mean(&self.visit_averages);
        self.explored = true;
        Some(visit_average)
    }

    pub fn current_score(&self) -> f64 {
        self.score
    }

    pub fn has_been_explored(&self) -> bool {
        self.explored
    }

    pub fn visit_averages(&self) -> &[f64] {
        &self.visit_averages
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
