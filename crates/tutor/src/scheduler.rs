use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beatwise_domain::StateKey;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, instrument, warn};

use crate::analytics::{EndReason, SessionSummary};
use crate::events::{EventSink, SessionEvent};
use crate::session::{ClickOutcome, Flow, SessionContext, SessionCore};
use crate::timeline::ScheduledTransition;
use crate::windows::ActiveWindow;
use crate::TutorError;

type SharedCore = Arc<Mutex<SessionCore>>;

fn lock(core: &SharedCore) -> Result<MutexGuard<'_, SessionCore>, TutorError> {
    core.lock().map_err(|_| TutorError::LockPoisoned)
}

/// Runs a session's cycles on a dedicated task. Dropping the scheduler
/// cancels the session.
pub struct BeatScheduler {
    core: SharedCore,
    cancel: CancellationToken,
    task: JoinHandle<Result<SessionSummary, TutorError>>,
    guard: DropGuard,
}

impl BeatScheduler {
    /// Plans the first cycle immediately and spawns the driver onto the
    /// current tokio runtime.
    pub fn start(
        context: SessionContext,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, TutorError> {
        let mut core = SessionCore::new(context, EventSink::new(events))?;
        let started = Instant::now();
        let first = core.begin_cycle(started)?;
        let core = Arc::new(Mutex::new(core));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(core.clone(), cancel.clone(), started, first));
        Ok(Self {
            core,
            guard: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }

    /// Handle for the input thread.
    pub fn clicker(&self) -> Clicker {
        Clicker {
            core: self.core.clone(),
        }
    }

    pub fn awaiting_click(&self) -> Result<Option<ActiveWindow>, TutorError> {
        Ok(lock(&self.core)?.awaiting_click())
    }

    pub fn current_state(&self) -> Result<StateKey, TutorError> {
        Ok(lock(&self.core)?.current_key().clone())
    }

    pub fn cycle_targets(&self) -> Result<Vec<usize>, TutorError> {
        Ok(lock(&self.core)?.cycle_targets())
    }

    /// Stops the session. Once this returns, clicks are refused and no
    /// pending transition fires.
    pub fn abort(&self) {
        match lock(&self.core) {
            Ok(mut core) => core.end(EndReason::Aborted),
            Err(err) => warn!(%err, "aborting with a poisoned session"),
        }
        self.cancel.cancel();
    }

    /// Waits for the driver. A driver that panicked ends the session with
    /// [`EndReason::Fault`].
    pub async fn join(self) -> Result<SessionSummary, TutorError> {
        let Self {
            core, task, guard, ..
        } = self;
        let result = task.await;
        drop(guard);
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = if err.is_panic() {
                    panic_message(err.into_panic())
                } else {
                    err.to_string()
                };
                error!(%reason, "session driver stopped");
                core.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .end(EndReason::Fault);
                Err(TutorError::DriverFailed(reason))
            }
        }
    }
}

/// Cloneable click entry point, safe to call from any thread.
#[derive(Clone)]
pub struct Clicker {
    core: SharedCore,
}

impl Clicker {
    pub fn click(&self) -> Result<ClickOutcome, TutorError> {
        let now = Instant::now();
        lock(&self.core)?.click(now)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "driver panicked".to_string()
    }
}

#[instrument(skip_all)]
async fn drive(
    core: SharedCore,
    cancel: CancellationToken,
    mut started: Instant,
    mut steps: Vec<ScheduledTransition>,
) -> Result<SessionSummary, TutorError> {
    loop {
        let mut next_cycle = false;
        for step in steps.drain(..) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let mut core = lock(&core)?;
                    core.end(EndReason::Aborted);
                    return Ok(core.summary());
                }
                _ = sleep_until(started + step.at) => {}
            }

            let mut guard = lock(&core)?;
            // The timer may have fired just as the session was aborted.
            if cancel.is_cancelled() {
                guard.end(EndReason::Aborted);
                return Ok(guard.summary());
            }
            match guard.apply(step.transition) {
                Ok(Flow::Continue) => {}
                Ok(Flow::NextCycle) => {
                    next_cycle = true;
                    break;
                }
                Ok(Flow::Finished) => return Ok(guard.summary()),
                Err(TutorError::SessionAlreadyEnded) => return Ok(guard.summary()),
                Err(err) if err.is_fatal() => {
                    error!(%err, transition = ?step.transition, "aborting session");
                    guard.end(EndReason::Fault);
                    return Err(err);
                }
                Err(err) => warn!(%err, transition = ?step.transition, "transition failed"),
            }
        }

        if !next_cycle {
            warn!("cycle ran out of transitions before its final bar");
            let mut guard = lock(&core)?;
            guard.end(EndReason::Fault);
            return Ok(guard.summary());
        }

        started = Instant::now();
        let mut guard = lock(&core)?;
        if cancel.is_cancelled() {
            guard.end(EndReason::Aborted);
            return Ok(guard.summary());
        }
        match guard.begin_cycle(started) {
            Ok(planned) => {
                info!(key = %guard.current_key(), "next cycle planned");
                steps = planned;
            }
            Err(TutorError::SessionAlreadyEnded) => return Ok(guard.summary()),
            Err(err) => {
                error!(%err, "could not start next cycle");
                guard.end(EndReason::Fault);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::clips::{ClipLibrary, FixedClips};
    use crate::config::SessionConfig;
    use beatwise_domain::{Catalog, PracticeState, PracticeStateSpace};
    use tokio::sync::mpsc;

    const BEAT: Duration = Duration::from_millis(100);

    fn seeded_context(visits: u32, seed: u64, clips: Box<dyn ClipLibrary>) -> SessionContext {
        let config = SessionConfig {
            visits,
            seed: Some(seed),
            ..Default::default()
        };
        let space = PracticeStateSpace::build(&Catalog::default()).unwrap();
        SessionContext::new(config, space, clips).unwrap()
    }

    fn context(visits: u32) -> SessionContext {
        seeded_context(visits, 23, Box::new(FixedClips(BEAT * 32)))
    }

    /// Serves the first clip, then crashes.
    struct CrashingClips {
        calls: AtomicUsize,
    }

    impl ClipLibrary for CrashingClips {
        fn clip_duration(&self, _state: &PracticeState) -> anyhow::Result<Duration> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                panic!("clip decoder crashed");
            }
            Ok(BEAT * 32)
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn count(events: &[SessionEvent], wanted: fn(&SessionEvent) -> bool) -> usize {
        events.iter().filter(|event| wanted(event)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn single_visit_without_clicks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BeatScheduler::start(context(1), tx).unwrap();
        let visited = scheduler.current_state().unwrap();
        let summary = scheduler.join().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::CycleFinished { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::NewState { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::NewBeat { .. })), 4);
        assert_eq!(summary.policy_consultations, 0);
        assert_eq!(summary.end_reason, EndReason::Completed);
        assert_eq!(summary.visits.len(), 1);
        assert_eq!(summary.visits[0].missed_windows, 4);
        assert_eq!(summary.visits[0].visit_average, None);

        let profile = summary.profile.states.iter().find(|s| s.key == visited).unwrap();
        assert!(!profile.explored);
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_inside_windows_are_credited_to_their_bar() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let scheduler = BeatScheduler::start(context(1), tx).unwrap();
        let visited = scheduler.current_state().unwrap();
        let targets = scheduler.cycle_targets().unwrap();
        let clicker = scheduler.clicker();

        for (bar, &target) in targets.iter().enumerate() {
            // half a beat late
            sleep_until(start + BEAT * target as u32 + BEAT / 2).await;
            let outcome = clicker.click().unwrap();
            let ClickOutcome::Accepted { bar: credited, target_beat, score } = outcome else {
                panic!("click for bar {bar} was ignored");
            };
            assert_eq!((credited, target_beat), (bar, target));
            assert!((score.unwrap() - 2.5 / 3.0).abs() < 1e-9);
            assert_eq!(clicker.click().unwrap(), ClickOutcome::Ignored);
        }

        let summary = scheduler.join().await.unwrap();
        let visit = &summary.visits[0];
        assert_eq!(visit.accepted_clicks, 4);
        assert_eq!(visit.late_clicks, 4);
        assert_eq!(visit.missed_windows, 0);
        assert!((visit.visit_average.unwrap() - 2.5 / 3.0).abs() < 1e-9);

        let profile = summary.profile.states.iter().find(|s| s.key == visited).unwrap();
        assert!(profile.explored);
        let scored = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::NewErrorValue { .. }))
            .count();
        assert_eq!(scored, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_outside_windows_are_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let scheduler = BeatScheduler::start(context(1), tx).unwrap();
        let clicker = scheduler.clicker();
        assert_eq!(clicker.click().unwrap(), ClickOutcome::Ignored);
        assert!(scheduler.awaiting_click().unwrap().is_none());

        let first = scheduler.cycle_targets().unwrap()[0];
        sleep_until(start + BEAT * first as u32).await;
        let waiting = scheduler.awaiting_click().unwrap().unwrap();
        assert_eq!((waiting.bar, waiting.target_beat), (0, first));

        let summary = scheduler.join().await.unwrap();
        assert_eq!(summary.visits[0].accepted_clicks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn several_visits_consult_policy_between_cycles() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BeatScheduler::start(context(3), tx).unwrap();
        let summary = scheduler.join().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::NewState { .. })), 3);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::CycleFinished { .. })), 3);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::SessionEnded { .. })), 1);
        assert_eq!(summary.policy_consultations, 2);
        assert_eq!(summary.visits.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_pending_transitions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let scheduler = BeatScheduler::start(context(5), tx).unwrap();
        let clicker = scheduler.clicker();

        sleep_until(start + BEAT * 10).await;
        scheduler.abort();
        let summary = scheduler.join().await.unwrap();
        assert_eq!(summary.end_reason, EndReason::Aborted);
        assert_eq!(summary.policy_consultations, 0);

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionEnded { reason: EndReason::Aborted })
        ));
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::CycleFinished { .. })), 0);

        tokio::time::sleep(BEAT * 64).await;
        assert!(drain(&mut rx).is_empty());
        assert!(matches!(clicker.click(), Err(TutorError::SessionAlreadyEnded)));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_refuses_click_inside_open_window() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let scheduler = BeatScheduler::start(context(1), tx).unwrap();
        let clicker = scheduler.clicker();
        let first = scheduler.cycle_targets().unwrap()[0];

        sleep_until(start + BEAT * first as u32).await;
        assert!(scheduler.awaiting_click().unwrap().is_some());
        scheduler.abort();
        assert!(matches!(clicker.click(), Err(TutorError::SessionAlreadyEnded)));

        let summary = scheduler.join().await.unwrap();
        assert_eq!(summary.end_reason, EndReason::Aborted);
        assert_eq!(summary.visits.len(), 1);
        assert_eq!(summary.visits[0].accepted_clicks, 0);
        assert!(summary.profile.explored().next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn each_target_is_announced_before_its_window_opens() {
        let time_window = SessionConfig::default().time_window as u32;
        for seed in 0..20 {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let start = Instant::now();
            let clips = Box::new(FixedClips(BEAT * 32));
            let scheduler = BeatScheduler::start(seeded_context(1, seed, clips), tx).unwrap();
            let targets = scheduler.cycle_targets().unwrap();

            let mut announced = Vec::new();
            for (bar, &target) in targets.iter().enumerate() {
                let opened = start + BEAT * (target as u32 - time_window);
                sleep_until(opened + Duration::from_millis(1)).await;
                announced.extend(drain(&mut rx).into_iter().filter_map(|event| match event {
                    SessionEvent::NewBeat { bar, beat, .. } => Some((bar, beat)),
                    _ => None,
                }));
                assert!(announced.contains(&(bar, target)), "seed {seed} bar {bar}");
            }

            scheduler.abort();
            scheduler.join().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn driver_panic_ends_session_with_fault() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let clips = Box::new(CrashingClips {
            calls: AtomicUsize::new(0),
        });
        let scheduler = BeatScheduler::start(seeded_context(2, 23, clips), tx).unwrap();
        let clicker = scheduler.clicker();

        let err = scheduler.join().await.unwrap_err();
        assert!(matches!(&err, TutorError::DriverFailed(reason) if reason.contains("clip decoder crashed")));
        assert!(err.is_fatal());

        let events = drain(&mut rx);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::CycleFinished { .. })), 1);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionEnded { reason: EndReason::Fault })
        ));
        assert!(matches!(clicker.click(), Err(TutorError::LockPoisoned)));
    }
}
