use std::time::Duration;

use rand::Rng;

use crate::config::CycleShape;
use crate::scoring::TargetTiming;

/// Evenly spaced beat offsets from the start of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatTimeline {
    cycle: Duration,
    offsets: Vec<Duration>,
}

impl BeatTimeline {
    pub fn new(cycle: Duration, shape: CycleShape) -> Self {
        let total = shape.total_beats() as u32;
        let offsets = (0..total).map(|beat| cycle * beat / total).collect();
        Self { cycle, offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn cycle_duration(&self) -> Duration {
        self.cycle
    }

    pub fn beat_duration(&self) -> Duration {
        self.cycle / self.offsets.len().max(1) as u32
    }

    pub fn offset(&self, beat: usize) -> Duration {
        self.offsets
            .get(beat)
            .copied()
            .unwrap_or_else(|| self.cycle * beat as u32 / self.offsets.len().max(1) as u32)
    }

    pub fn offset_ms(&self, beat: usize) -> f64 {
        as_millis_f64(self.offset(beat))
    }

    pub fn target_timing(&self, target_beat: usize, time_window: usize) -> TargetTiming {
        TargetTiming {
            target_ms: self.offset_ms(target_beat),
            left_boundary_ms: self.offset_ms(target_beat.saturating_sub(time_window)),
            beat_ms: as_millis_f64(self.beat_duration()),
        }
    }
}

pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Announces a bar's target beat ahead of its window.
    Cue { bar: usize },
    OpenWindow { bar: usize },
    CloseWindow { bar: usize },
    BarTick { bar: usize },
}

impl Transition {
    /// Tie-break for transitions due at the same instant.
    fn priority(&self) -> u8 {
        match self {
            Self::CloseWindow { .. } => 0,
            Self::Cue { .. } => 1,
            Self::OpenWindow { .. } => 2,
            Self::BarTick { .. } => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledTransition {
    /// Offset from the cycle start.
    pub at: Duration,
    pub transition: Transition,
}

/// Everything decided at the start of a cycle: the timeline, one target beat
/// per bar, and the ordered transitions that drive the windows.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub timeline: BeatTimeline,
    pub targets: Vec<usize>,
    pub transitions: Vec<ScheduledTransition>,
}

impl CyclePlan {
    pub fn build<R: Rng + ?Sized>(
        cycle: Duration,
        shape: CycleShape,
        time_window: usize,
        rng: &mut R,
    ) -> Self {
        let timeline = BeatTimeline::new(cycle, shape);
        let targets = draw_targets(shape, time_window, rng);
        let bar_duration = cycle / shape.bars as u32;

        let mut transitions = Vec::with_capacity(targets.len() * 3 + shape.bars);
        for (bar, &target) in targets.iter().enumerate() {
            let opens_at = timeline.offset(target - time_window);
            // Bar 0 is announced when the cycle starts.
            if bar > 0 {
                transitions.push(ScheduledTransition {
                    at: opens_at.min(bar_duration * bar as u32),
                    transition: Transition::Cue { bar },
                });
            }
            transitions.push(ScheduledTransition {
                at: opens_at,
                transition: Transition::OpenWindow { bar },
            });
            transitions.push(ScheduledTransition {
                at: timeline.offset(target + time_window),
                transition: Transition::CloseWindow { bar },
            });
        }
        for bar in 0..shape.bars {
            let at = if bar + 1 == shape.bars {
                cycle
            } else {
                bar_duration * (bar as u32 + 1)
            };
            transitions.push(ScheduledTransition {
                at,
                transition: Transition::BarTick { bar },
            });
        }
        transitions.sort_by_key(|step| (step.at, step.transition.priority()));

        Self {
            timeline,
            targets,
            transitions,
        }
    }

    pub fn target_timing(&self, target_beat: usize, time_window: usize) -> TargetTiming {
        self.timeline.target_timing(target_beat, time_window)
    }
}

/// One target per bar, drawn from the bar's beats so that its whole window
/// stays inside the cycle.
pub fn draw_targets<R: Rng + ?Sized>(shape: CycleShape, time_window: usize, rng: &mut R) -> Vec<usize> {
    let total = shape.total_beats();
    (0..shape.bars)
        .map(|bar| {
            let low = (bar * shape.beats_per_bar).max(time_window);
            let high = ((bar + 1) * shape.beats_per_bar).min(total - time_window);
            rng.gen_range(low..high)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn shape() -> CycleShape {
        CycleShape::default()
    }

    #[test]
    fn timeline_has_one_offset_per_beat() {
        let timeline = BeatTimeline::new(Duration::from_millis(3_200), shape());
        assert_eq!(timeline.len(), 32);
        assert_eq!(timeline.beat_duration(), Duration::from_millis(100));
        assert_eq!(timeline.offset(0), Duration::ZERO);
        assert_eq!(timeline.offset(31), Duration::from_millis(3_100));
        assert_eq!(timeline.offset(32), Duration::from_millis(3_200));
    }

    #[test]
    fn target_timing_matches_window() {
        let timeline = BeatTimeline::new(Duration::from_millis(9_568), shape());
        let timing = timeline.target_timing(7, 3);
        assert_eq!(timing.target_ms, 2_093.0);
        assert_eq!(timing.left_boundary_ms, 1_196.0);
        assert_eq!(timing.beat_ms, 299.0);
    }

    #[test]
    fn targets_fall_in_their_bar() {
        let mut rng = Pcg32::seed_from_u64(42);
        for _ in 0..500 {
            let targets = draw_targets(shape(), 3, &mut rng);
            assert_eq!(targets.len(), 4);
            assert!((3..8).contains(&targets[0]));
            assert!((8..16).contains(&targets[1]));
            assert!((16..24).contains(&targets[2]));
            assert!((24..29).contains(&targets[3]));
        }
    }

    #[test]
    fn plan_pairs_every_open_with_a_later_close() {
        let mut rng = Pcg32::seed_from_u64(9);
        for _ in 0..200 {
            let plan = CyclePlan::build(Duration::from_millis(3_200), shape(), 3, &mut rng);
            assert_eq!(plan.transitions.len(), 15);
            for bar in 0..4 {
                let position = |wanted: Transition| {
                    plan.transitions
                        .iter()
                        .position(|step| step.transition == wanted)
                        .unwrap()
                };
                assert!(
                    position(Transition::OpenWindow { bar }) < position(Transition::CloseWindow { bar })
                );
            }
            let opens: Vec<usize> = plan
                .transitions
                .iter()
                .filter_map(|step| match step.transition {
                    Transition::OpenWindow { bar } => Some(bar),
                    _ => None,
                })
                .collect();
            assert_eq!(opens, vec![0, 1, 2, 3]);
            let last = plan.transitions.last().unwrap();
            assert_eq!(last.transition, Transition::BarTick { bar: 3 });
            assert_eq!(last.at, Duration::from_millis(3_200));
        }
    }

    #[test]
    fn at_most_two_windows_overlap() {
        let mut rng = Pcg32::seed_from_u64(5);
        for _ in 0..200 {
            let plan = CyclePlan::build(Duration::from_millis(3_200), shape(), 3, &mut rng);
            let mut open = 0i32;
            for step in &plan.transitions {
                match step.transition {
                    Transition::OpenWindow { .. } => open += 1,
                    Transition::CloseWindow { .. } => open -= 1,
                    Transition::Cue { .. } | Transition::BarTick { .. } => {}
                }
                assert!((0..=2).contains(&open));
            }
            assert_eq!(open, 0);
        }
    }

    #[test]
    fn every_bar_is_cued_before_its_window_opens() {
        let bar_duration = Duration::from_millis(800);
        for seed in 0..50 {
            let mut rng = Pcg32::seed_from_u64(seed);
            let plan = CyclePlan::build(Duration::from_millis(3_200), shape(), 3, &mut rng);
            let find = |wanted: Transition| {
                plan.transitions
                    .iter()
                    .position(|step| step.transition == wanted)
                    .unwrap()
            };
            assert!(!plan
                .transitions
                .iter()
                .any(|step| step.transition == Transition::Cue { bar: 0 }));
            for bar in 1..4 {
                let cue = find(Transition::Cue { bar });
                assert!(cue < find(Transition::OpenWindow { bar }), "seed {seed} bar {bar}");
                assert!(plan.transitions[cue].at <= bar_duration * bar as u32);
            }
        }
    }
}
