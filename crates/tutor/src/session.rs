use std::time::Duration;

use beatwise_domain::{DomainError, PracticeState, PracticeStateSpace, StateKey};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analytics::{EndReason, SessionSummary, VisitReport};
use crate::clips::{ClipLibrary, TempoClips};
use crate::config::{SessionConfig, TrainerConfig};
use crate::events::{EventSink, SessionEvent};
use crate::policy::DifficultyPolicy;
use crate::scoring::{scorer_for, ErrorScorer};
use crate::timeline::{as_millis_f64, CyclePlan, ScheduledTransition, Transition};
use crate::windows::{ActiveWindow, CloseOutcome, WindowSlots};
use crate::TutorError;

/// Collaborators and settings for one practice session, built once and
/// handed to the scheduler.
pub struct SessionContext {
    pub config: SessionConfig,
    pub space: PracticeStateSpace,
    pub policy: DifficultyPolicy,
    pub scorer: Box<dyn ErrorScorer>,
    pub clips: Box<dyn ClipLibrary>,
    pub rng: Pcg32,
}

impl SessionContext {
    pub fn new(
        config: SessionConfig,
        space: PracticeStateSpace,
        clips: Box<dyn ClipLibrary>,
    ) -> Result<Self, TutorError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };
        Ok(Self {
            policy: DifficultyPolicy::with_threshold(config.policy, config.threshold()),
            scorer: scorer_for(&config),
            config,
            space,
            clips,
            rng,
        })
    }

    pub fn from_config(config: &TrainerConfig) -> Result<Self, TutorError> {
        let space = PracticeStateSpace::build(&config.catalog)?;
        let clips = Box::new(TempoClips::new(config.session.cycle));
        Self::new(config.session.clone(), space, clips)
    }

    pub fn with_scorer(mut self, scorer: Box<dyn ErrorScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_policy(mut self, policy: DifficultyPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClickOutcome {
    /// The click was credited to a window. `score` is `None` when the value
    /// fell outside [0, 1] and was rejected.
    Accepted {
        bar: usize,
        target_beat: usize,
        score: Option<f64>,
    },
    /// No window was waiting for a click.
    Ignored,
}

/// What the driver should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    NextCycle,
    Finished,
}

/// All mutable session state. The scheduler task and the click path both
/// go through one lock around this value.
pub struct SessionCore {
    ctx: SessionContext,
    events: EventSink,
    windows: WindowSlots,
    current: StateKey,
    plan: Option<CyclePlan>,
    cycle_started: Instant,
    cycle_duration: Duration,
    remaining_bars: usize,
    remaining_visits: u32,
    visit: Option<VisitReport>,
    reports: Vec<VisitReport>,
    policy_consultations: u32,
    ended: Option<EndReason>,
}

impl SessionCore {
    pub fn new(mut ctx: SessionContext, events: EventSink) -> Result<Self, TutorError> {
        let current = ctx.policy.initial_state(&ctx.space, &mut ctx.rng)?;
        let remaining_visits = ctx.config.visits;
        Ok(Self {
            ctx,
            events,
            windows: WindowSlots::new(),
            current,
            plan: None,
            cycle_started: Instant::now(),
            cycle_duration: Duration::ZERO,
            remaining_bars: 0,
            remaining_visits,
            visit: None,
            reports: Vec::new(),
            policy_consultations: 0,
            ended: None,
        })
    }

    pub fn current_key(&self) -> &StateKey {
        &self.current
    }

    pub fn current_state(&self) -> Result<&PracticeState, TutorError> {
        self.ctx
            .space
            .get(&self.current)
            .ok_or_else(|| missing_state(&self.current))
    }

    pub fn space(&self) -> &PracticeStateSpace {
        &self.ctx.space
    }

    pub fn awaiting_click(&self) -> Option<ActiveWindow> {
        self.windows.awaiting_click()
    }

    pub fn cycle_targets(&self) -> Vec<usize> {
        self.plan
            .as_ref()
            .map(|plan| plan.targets.clone())
            .unwrap_or_default()
    }

    pub fn remaining_visits(&self) -> u32 {
        self.remaining_visits
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_some()
    }

    /// Plans the next cycle on the current state and returns its transitions,
    /// each due at `now` plus its offset.
    pub fn begin_cycle(&mut self, now: Instant) -> Result<Vec<ScheduledTransition>, TutorError> {
        if self.ended.is_some() {
            return Err(TutorError::SessionAlreadyEnded);
        }
        let state = self.current_state()?;
        let duration = match self.ctx.clips.clip_duration(state) {
            Ok(duration) => duration,
            Err(err) if !self.cycle_duration.is_zero() => {
                error!(key = %self.current, %err, "clip duration unavailable, reusing previous");
                self.cycle_duration
            }
            Err(err) => return Err(TutorError::Clip(err.to_string())),
        };
        let new_state = SessionEvent::NewState {
            key: state.key().clone(),
            bpm: state.bpm(),
            instruments: state.instruments().to_vec(),
        };

        let config = &self.ctx.config;
        let plan = CyclePlan::build(duration, config.cycle, config.time_window, &mut self.ctx.rng);
        self.windows.reset();
        self.remaining_bars = config.cycle.bars;
        self.cycle_started = now;
        self.cycle_duration = duration;
        self.visit = Some(VisitReport::new(self.current.clone()));
        info!(
            key = %self.current,
            duration_ms = as_millis_f64(duration),
            targets = ?plan.targets,
            "cycle started"
        );

        self.events.emit(new_state);
        self.events.emit(SessionEvent::NewBeat {
            bar: 0,
            beat: plan.targets[0],
            next_beat: plan.targets.get(1).copied(),
        });
        let transitions = plan.transitions.clone();
        self.plan = Some(plan);
        Ok(transitions)
    }

    pub fn apply(&mut self, transition: Transition) -> Result<Flow, TutorError> {
        if let Some(reason) = self.ended {
            warn!(?transition, ?reason, "transition after session end ignored");
            return Err(TutorError::SessionAlreadyEnded);
        }
        match transition {
            Transition::Cue { bar } => {
                let beat = self.target(bar)?;
                let next_beat = self.target(bar + 1).ok();
                self.events.emit(SessionEvent::NewBeat {
                    bar,
                    beat,
                    next_beat,
                });
                Ok(Flow::Continue)
            }
            Transition::OpenWindow { bar } => {
                let target = self.target(bar)?;
                self.windows.open(bar, target);
                Ok(Flow::Continue)
            }
            Transition::CloseWindow { bar } => {
                if let CloseOutcome::Missed(window) = self.windows.close(bar)? {
                    debug!(bar, beat = window.target_beat, "window missed");
                    if let Some(visit) = self.visit.as_mut() {
                        visit.missed_windows += 1;
                    }
                }
                Ok(Flow::Continue)
            }
            Transition::BarTick { bar } => {
                self.remaining_bars = self.remaining_bars.saturating_sub(1);
                if self.remaining_bars > 0 {
                    debug!(bar, remaining = self.remaining_bars, "bar finished");
                    return Ok(Flow::Continue);
                }
                self.finish_cycle()
            }
        }
    }

    /// Credits a click made at `now` to the window waiting for one.
    pub fn click(&mut self, now: Instant) -> Result<ClickOutcome, TutorError> {
        if let Some(reason) = self.ended {
            warn!(?reason, "click after session end ignored");
            return Err(TutorError::SessionAlreadyEnded);
        }
        let Some(window) = self.windows.click() else {
            return Ok(ClickOutcome::Ignored);
        };
        let Some(plan) = self.plan.as_ref() else {
            return Ok(ClickOutcome::Ignored);
        };
        let click_ms = as_millis_f64(now.saturating_duration_since(self.cycle_started));
        let timing = plan.target_timing(window.target_beat, self.ctx.config.time_window);
        let raw = self.ctx.scorer.score(click_ms, &timing);

        if let Some(visit) = self.visit.as_mut() {
            visit.accepted_clicks += 1;
            if click_ms < timing.target_ms {
                visit.early_clicks += 1;
            } else if click_ms > timing.target_ms {
                visit.late_clicks += 1;
            }
        }

        let score = match self.ctx.config.out_of_range.apply(raw) {
            Ok(score) => score,
            Err(err) => {
                warn!(%err, bar = window.bar, click_ms, "score discarded");
                if let Some(visit) = self.visit.as_mut() {
                    visit.rejected_scores += 1;
                }
                return Ok(ClickOutcome::Accepted {
                    bar: window.bar,
                    target_beat: window.target_beat,
                    score: None,
                });
            }
        };

        let current = self.current.clone();
        self.ctx
            .space
            .get_mut(&current)
            .ok_or_else(|| missing_state(&current))?
            .record_sample(score);
        debug!(bar = window.bar, beat = window.target_beat, click_ms, score, "click scored");
        self.events.emit(SessionEvent::NewErrorValue {
            bar: window.bar,
            beat: window.target_beat,
            score,
        });
        Ok(ClickOutcome::Accepted {
            bar: window.bar,
            target_beat: window.target_beat,
            score: Some(score),
        })
    }

    /// Marks the session over. Only the first call has any effect.
    pub fn end(&mut self, reason: EndReason) {
        if self.ended.is_some() {
            return;
        }
        self.ended = Some(reason);
        if let Some(visit) = self.visit.take() {
            self.reports.push(visit);
        }
        info!(?reason, visits = self.reports.len(), "session ended");
        self.events.emit(SessionEvent::SessionEnded { reason });
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            visits: self.reports.clone(),
            end_reason: self.ended.unwrap_or(EndReason::Aborted),
            policy_consultations: self.policy_consultations,
            profile: self.ctx.space.snapshot(),
        }
    }

    fn finish_cycle(&mut self) -> Result<Flow, TutorError> {
        let key = self.current.clone();
        let state = self
            .ctx
            .space
            .get_mut(&key)
            .ok_or_else(|| missing_state(&key))?;
        let visit_average = state.aggregate();
        let score_after = state.current_score();
        if let Some(mut visit) = self.visit.take() {
            visit.visit_average = visit_average;
            visit.score_after = score_after;
            self.reports.push(visit);
        }
        info!(%key, ?visit_average, score_after, "cycle finished");
        self.events.emit(SessionEvent::CycleFinished { key, visit_average });

        self.remaining_visits = self.remaining_visits.saturating_sub(1);
        if self.remaining_visits == 0 {
            self.end(EndReason::Completed);
            return Ok(Flow::Finished);
        }
        let next = self
            .ctx
            .policy
            .get_next_state(&self.ctx.space, &self.current, &mut self.ctx.rng)?;
        self.policy_consultations += 1;
        self.current = next;
        Ok(Flow::NextCycle)
    }

    fn target(&self, bar: usize) -> Result<usize, TutorError> {
        self.plan
            .as_ref()
            .and_then(|plan| plan.targets.get(bar).copied())
            .ok_or_else(|| TutorError::configuration(format!("no target planned for bar {bar}")))
    }
}

fn missing_state(key: &StateKey) -> TutorError {
    DomainError::malformed_key(key.as_str(), "not in practice space").into()
}
