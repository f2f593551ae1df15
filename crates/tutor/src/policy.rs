use std::fmt;

use beatwise_domain::{PracticeState, PracticeStateSpace, StateKey};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TutorError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVariant {
    /// Keeps the learner on the slowest tempo with at most two instruments.
    Easy,
    #[default]
    Hard,
}

impl PolicyVariant {
    pub fn threshold(self) -> f64 {
        match self {
            Self::Easy => 0.65,
            Self::Hard => 0.82,
        }
    }

    pub fn rules(self) -> ClassificationRules {
        match self {
            Self::Easy => ClassificationRules {
                is_eligible: slow_and_sparse,
                ..ClassificationRules::standard()
            },
            Self::Hard => ClassificationRules::standard(),
        }
    }
}

/// Candidate buckets, tried in an order that depends on how well the
/// learner did on the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    HarderUnexplored,
    HarderExplored,
    EasierUnexplored,
    EasierExplored,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::HarderUnexplored => "harder-unexplored",
            Self::HarderExplored => "harder-explored",
            Self::EasierUnexplored => "easier-unexplored",
            Self::EasierExplored => "easier-explored",
        };
        f.write_str(label)
    }
}

const ESCALATE: [Category; 4] = [
    Category::HarderUnexplored,
    Category::HarderExplored,
    Category::EasierUnexplored,
    Category::EasierExplored,
];

const DEESCALATE: [Category; 4] = [
    Category::EasierUnexplored,
    Category::EasierExplored,
    Category::HarderUnexplored,
    Category::HarderExplored,
];

type Eligibility = fn(&PracticeState, &PracticeStateSpace) -> bool;
/// `(current, candidate)` predicate.
type Relation = fn(&PracticeState, &PracticeState) -> bool;

/// Predicate bundle that parameterizes the shared selection algorithm.
#[derive(Clone, Copy)]
pub struct ClassificationRules {
    pub is_eligible: Eligibility,
    pub is_harder_unexplored: Relation,
    pub is_harder_explored: Relation,
    pub is_easier_unexplored: Relation,
    pub is_easier_explored: Relation,
}

impl ClassificationRules {
    pub fn standard() -> Self {
        Self {
            is_eligible: |_, _| true,
            is_harder_unexplored: harder_unexplored,
            is_harder_explored: harder_explored,
            is_easier_unexplored: easier_unexplored,
            is_easier_explored: easier_explored,
        }
    }

    fn matches(&self, category: Category, current: &PracticeState, candidate: &PracticeState) -> bool {
        let relation = match category {
            Category::HarderUnexplored => self.is_harder_unexplored,
            Category::HarderExplored => self.is_harder_explored,
            Category::EasierUnexplored => self.is_easier_unexplored,
            Category::EasierExplored => self.is_easier_explored,
        };
        relation(current, candidate)
    }
}

fn harder_unexplored(current: &PracticeState, candidate: &PracticeState) -> bool {
    if candidate.has_been_explored() {
        return false;
    }
    candidate.tempo_rank() > current.tempo_rank()
        || candidate.instrument_count() > current.instrument_count()
        || (candidate.instrument_count() == current.instrument_count()
            && candidate.tempo_rank() == current.tempo_rank()
            && candidate.instruments() != current.instruments())
}

fn easier_unexplored(current: &PracticeState, candidate: &PracticeState) -> bool {
    !candidate.has_been_explored()
        && (candidate.instrument_count() < current.instrument_count()
            || candidate.tempo_rank() < current.tempo_rank())
}

fn harder_explored(current: &PracticeState, candidate: &PracticeState) -> bool {
    candidate.has_been_explored() && candidate.current_score() < current.current_score()
}

fn easier_explored(current: &PracticeState, candidate: &PracticeState) -> bool {
    candidate.has_been_explored() && candidate.current_score() >= current.current_score()
}

fn slow_and_sparse(state: &PracticeState, space: &PracticeStateSpace) -> bool {
    state.tempo().id == space.slowest_tempo().id && state.instrument_count() <= 2
}

/// Chooses which practice state to visit next.
#[derive(Clone)]
pub struct DifficultyPolicy {
    variant: PolicyVariant,
    threshold: f64,
    rules: ClassificationRules,
}

impl DifficultyPolicy {
    pub fn new(variant: PolicyVariant) -> Self {
        Self::with_threshold(variant, variant.threshold())
    }

    pub fn with_threshold(variant: PolicyVariant, threshold: f64) -> Self {
        Self {
            variant,
            threshold,
            rules: variant.rules(),
        }
    }

    pub fn with_rules(variant: PolicyVariant, threshold: f64, rules: ClassificationRules) -> Self {
        Self {
            variant,
            threshold,
            rules,
        }
    }

    pub fn variant(&self) -> PolicyVariant {
        self.variant
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A random single-instrument state at the slowest tempo.
    pub fn initial_state<R: Rng + ?Sized>(
        &self,
        space: &PracticeStateSpace,
        rng: &mut R,
    ) -> Result<StateKey, TutorError> {
        let slowest = space.slowest_tempo().id;
        let pool: Vec<&PracticeState> = space
            .states()
            .filter(|state| state.instrument_count() == 1 && state.tempo().id == slowest)
            .filter(|state| (self.rules.is_eligible)(state, space))
            .collect();
        pool.choose(rng)
            .map(|state| state.key().clone())
            .ok_or_else(|| TutorError::configuration("no eligible starting state"))
    }

    pub fn get_next_state<R: Rng + ?Sized>(
        &self,
        space: &PracticeStateSpace,
        current: &StateKey,
        rng: &mut R,
    ) -> Result<StateKey, TutorError> {
        let state = space.get(current).ok_or_else(|| TutorError::NoCandidate {
            key: current.clone(),
        })?;
        let pool: Vec<&PracticeState> = space
            .neighbors(current)
            .into_iter()
            .filter(|candidate| (self.rules.is_eligible)(candidate, space))
            .collect();

        if !state.has_been_explored() {
            let (unexplored, explored): (Vec<&PracticeState>, Vec<&PracticeState>) = pool
                .iter()
                .copied()
                .partition(|candidate| !candidate.has_been_explored());
            let chosen = unexplored.choose(rng).or_else(|| explored.choose(rng));
            if let Some(next) = chosen {
                debug!(from = %current, to = %next.key(), "leaving unexplored state");
                return Ok(next.key().clone());
            }
            return Err(TutorError::NoCandidate {
                key: current.clone(),
            });
        }

        let order = if state.current_score() > self.threshold {
            &ESCALATE
        } else {
            &DEESCALATE
        };
        for &category in order {
            let bucket: Vec<&PracticeState> = pool
                .iter()
                .copied()
                .filter(|candidate| self.rules.matches(category, state, candidate))
                .collect();
            if let Some(next) = bucket.choose(rng) {
                debug!(
                    from = %current,
                    to = %next.key(),
                    score = state.current_score(),
                    threshold = self.threshold,
                    %category,
                    "selected next state"
                );
                return Ok(next.key().clone());
            }
        }
        Err(TutorError::NoCandidate {
            key: current.clone(),
        })
    }
}

impl fmt::Debug for DifficultyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifficultyPolicy")
            .field("variant", &self.variant)
            .field("threshold", &self.threshold)
            .finish()
    }
}
