use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use beatwise_domain::Catalog;
use serde::{Deserialize, Serialize};

use crate::policy::PolicyVariant;
use crate::scoring::{LinearOptions, OutOfRangePolicy};
use crate::TutorError;

/// Bars per cycle and beats per bar.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CycleShape {
    pub bars: usize,
    pub beats_per_bar: usize,
}

impl CycleShape {
    pub fn total_beats(&self) -> usize {
        self.bars * self.beats_per_bar
    }
}

impl Default for CycleShape {
    fn default() -> Self {
        Self {
            bars: 4,
            beats_per_bar: 8,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    #[default]
    Linear,
    Gaussian,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of cycles (state visits) in a session.
    pub visits: u32,
    /// Beats on each side of a target during which a click is accepted.
    pub time_window: usize,
    pub cycle: CycleShape,
    pub policy: PolicyVariant,
    /// Overrides the variant's built-in threshold.
    pub threshold: Option<f64>,
    pub scorer: ScorerKind,
    pub linear: LinearOptions,
    pub out_of_range: OutOfRangePolicy,
    pub seed: Option<u64>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), TutorError> {
        if self.visits == 0 {
            return Err(TutorError::configuration("visits must be at least 1"));
        }
        if self.cycle.bars == 0 || self.cycle.beats_per_bar == 0 {
            return Err(TutorError::configuration(
                "cycle needs at least one bar of at least one beat",
            ));
        }
        if self.time_window == 0 {
            return Err(TutorError::configuration("time_window must be at least 1"));
        }
        if 2 * self.time_window >= self.cycle.beats_per_bar {
            return Err(TutorError::configuration(format!(
                "time_window {} is too wide for {} beats per bar",
                self.time_window, self.cycle.beats_per_bar
            )));
        }
        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(TutorError::configuration("threshold must lie in [0, 1]"));
            }
        }
        if self.linear.denominator_beats <= 0.0 {
            return Err(TutorError::configuration(
                "linear denominator_beats must be positive",
            ));
        }
        Ok(())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold.unwrap_or_else(|| self.policy.threshold())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            visits: 10,
            time_window: 3,
            cycle: CycleShape::default(),
            policy: PolicyVariant::default(),
            threshold: None,
            scorer: ScorerKind::default(),
            linear: LinearOptions::default(),
            out_of_range: OutOfRangePolicy::default(),
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TrainerConfig {
    pub catalog: Catalog,
    pub session: SessionConfig,
}

impl TrainerConfig {
    /// Reads YAML or JSON, chosen by file extension (YAML otherwise).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw =
            fs::read_to_string(path).with_context(|| format!("read config file {path:?}"))?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&raw)?,
            _ => Self::from_yaml_str(&raw)?,
        };
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("parse yaml config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("parse json config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TutorError> {
        self.catalog.validate()?;
        self.session.validate()
    }
}
