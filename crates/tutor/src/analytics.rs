use beatwise_domain::{ProfileSnapshot, StateKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Completed,
    Aborted,
    Fault,
}

/// What happened during one visit to a practice state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitReport {
    pub key: StateKey,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub accepted_clicks: usize,
    pub early_clicks: usize,
    pub late_clicks: usize,
    pub missed_windows: usize,
    pub rejected_scores: usize,
    pub visit_average: Option<f64>,
    pub score_after: f64,
}

impl VisitReport {
    pub fn new(key: StateKey) -> Self {
        Self {
            key,
            started_at: OffsetDateTime::now_utc(),
            accepted_clicks: 0,
            early_clicks: 0,
            late_clicks: 0,
            missed_windows: 0,
            rejected_scores: 0,
            visit_average: None,
            score_after: 0.0,
        }
    }

    pub fn windows(&self) -> usize {
        self.accepted_clicks + self.missed_windows
    }

    /// Share of windows that received a click.
    pub fn hit_rate(&self) -> f32 {
        if self.windows() == 0 {
            return 0.0;
        }
        self.accepted_clicks as f32 / self.windows() as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub visits: Vec<VisitReport>,
    pub end_reason: EndReason,
    pub policy_consultations: u32,
    pub profile: ProfileSnapshot,
}

impl SessionSummary {
    /// Mean of the visit averages of visits that recorded any sample.
    pub fn mean_accuracy(&self) -> Option<f64> {
        let averages: Vec<f64> = self
            .visits
            .iter()
            .filter_map(|visit| visit.visit_average)
            .collect();
        if averages.is_empty() {
            None
        } else {
            Some(averages.iter().sum::<f64>() / averages.len() as f64)
        }
    }

    pub fn total_clicks(&self) -> usize {
        self.visits.iter().map(|visit| visit.accepted_clicks).sum()
    }

    pub fn total_misses(&self) -> usize {
        self.visits.iter().map(|visit| visit.missed_windows).sum()
    }
}
