use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Catalog, DomainError, Neighbors, PracticeState, StateKey, Tempo, TempoScale};

/// Every instrument-subset × tempo combination for a session, keyed by
/// canonical state key. Topology is fixed once built.
#[derive(Clone, Debug)]
pub struct PracticeStateSpace {
    catalog: Catalog,
    scale: TempoScale,
    states: BTreeMap<StateKey, PracticeState>,
}

impl PracticeStateSpace {
    pub fn build(catalog: &Catalog) -> Result<Self, DomainError> {
        catalog.validate()?;
        let scale = catalog.tempo_scale()?;
        let mut ids: Vec<u8> = catalog.instruments.iter().map(|i| i.id).collect();
        ids.sort_unstable();

        let subsets = non_empty_subsets(&ids);
        let mut states = BTreeMap::new();
        for (rank, tempo) in scale.tempos().iter().enumerate() {
            for subset in &subsets {
                let state = PracticeState::new(subset.clone(), tempo.clone(), rank);
                states.insert(state.key().clone(), state);
            }
        }

        let links: Vec<(StateKey, Neighbors)> = states
            .values()
            .map(|state| (state.key().clone(), neighbors_of(state, &ids, &scale)))
            .collect();
        for (key, neighbors) in links {
            if let Some(state) = states.get_mut(&key) {
                state.set_neighbors(neighbors);
            }
        }

        debug!(
            instruments = ids.len(),
            tempos = scale.len(),
            states = states.len(),
            "built practice state space"
        );
        Ok(Self {
            catalog: catalog.clone(),
            scale,
            states,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tempo_scale(&self) -> &TempoScale {
        &self.scale
    }

    pub fn slowest_tempo(&self) -> &Tempo {
        self.scale.slowest()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, key: &StateKey) -> Option<&PracticeState> {
        self.states.get(key)
    }

    pub fn get_mut(&mut self, key: &StateKey) -> Option<&mut PracticeState> {
        self.states.get_mut(key)
    }

    /// Looks a state up by its raw key, validating the key first.
    pub fn lookup(&self, raw: &str) -> Result<&PracticeState, DomainError> {
        let (ids, tempo) = StateKey::parse(raw, &self.catalog)?;
        let key = StateKey::render(&ids, tempo);
        self.states
            .get(&key)
            .ok_or_else(|| DomainError::malformed_key(raw, "no such state"))
    }

    /// States in key order.
    pub fn states(&self) -> impl Iterator<Item = &PracticeState> {
        self.states.values()
    }

    pub fn neighbors(&self, key: &StateKey) -> Vec<&PracticeState> {
        self.states
            .get(key)
            .map(|state| {
                state
                    .neighbors()
                    .all()
                    .into_iter()
                    .filter_map(|neighbor| self.states.get(neighbor))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            states: self
                .states
                .values()
                .map(|state| StateSnapshot {
                    key: state.key().clone(),
                    instruments: state
                        .instruments()
                        .iter()
                        .filter_map(|id| self.catalog.instrument(*id))
                        .map(|instrument| instrument.name.clone())
                        .collect(),
                    tempo: state.tempo().name.clone(),
                    bpm: state.bpm(),
                    explored: state.has_been_explored(),
                    visit_averages: state.visit_averages().to_vec(),
                    score: state.current_score(),
                })
                .collect(),
        }
    }
}

/// Serializable view of the accuracy profile held by a space.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfileSnapshot {
    pub states: Vec<StateSnapshot>,
}

impl ProfileSnapshot {
    pub fn explored(&self) -> impl Iterator<Item = &StateSnapshot> {
        self.states.iter().filter(|state| state.explored)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub key: StateKey,
    pub instruments: Vec<String>,
    pub tempo: String,
    pub bpm: f32,
    pub explored: bool,
    pub visit_averages: Vec<f64>,
    pub score: f64,
}

fn non_empty_subsets(ids: &[u8]) -> Vec<Vec<u8>> {
    let mut subsets = Vec::with_capacity((1usize << ids.len()) - 1);
    for mask in 1u64..(1u64 << ids.len()) {
        let subset = ids
            .iter()
            .enumerate()
            .filter(|(bit, _)| mask & (1 << bit) != 0)
            .map(|(_, id)| *id)
            .collect();
        subsets.push(subset);
    }
    subsets
}

fn neighbors_of(state: &PracticeState, all_ids: &[u8], scale: &TempoScale) -> Neighbors {
    let current = state.instruments();
    let tempo_id = state.tempo().id;
    let absent: Vec<u8> = all_ids
        .iter()
        .copied()
        .filter(|id| !current.contains(id))
        .collect();

    let tempo = [scale.slower(tempo_id), scale.faster(tempo_id)]
        .into_iter()
        .flatten()
        .map(|other| StateKey::render(current, other.id))
        .collect();

    let add_one = absent
        .iter()
        .map(|added| {
            let mut ids = current.to_vec();
            ids.push(*added);
            StateKey::render(&ids, tempo_id)
        })
        .collect();

    let remove_one = if current.len() > 1 {
        current
            .iter()
            .map(|removed| {
                let ids: Vec<u8> = current.iter().copied().filter(|id| id != removed).collect();
                StateKey::render(&ids, tempo_id)
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut swap_one = Vec::with_capacity(current.len() * absent.len());
    for removed in current {
        for added in &absent {
            let mut ids: Vec<u8> = current.iter().copied().filter(|id| id != removed).collect();
            ids.push(*added);
            swap_one.push(StateKey::render(&ids, tempo_id));
        }
    }

    Neighbors {
        tempo,
        add_one,
        remove_one,
        swap_one,
    }
}
