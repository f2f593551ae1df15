use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::TutorError;

/// One of the two reusable acceptance slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotId {
    First,
    Second,
}

impl SlotId {
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSlot {
    /// Sequence number of the window-open that last populated this slot,
    /// 0 while the slot has not been opened this cycle.
    pub open_count: u32,
    pub target_beat: usize,
    pub bar: usize,
    pub has_clicked: bool,
}

impl WindowSlot {
    fn closed() -> Self {
        Self {
            open_count: 0,
            target_beat: 0,
            bar: 0,
            has_clicked: true,
        }
    }

    fn is_pending(&self) -> bool {
        self.open_count > 0 && !self.has_clicked
    }
}

/// The window a click or close was resolved against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub slot: SlotId,
    pub bar: usize,
    pub target_beat: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The window closed without a click.
    Missed(ActiveWindow),
    /// The window had already accepted its click.
    AlreadyResolved,
}

/// Two overlapping acceptance windows and the trackers that decide which
/// slot opens next and which slot takes the next click.
#[derive(Clone, Debug)]
pub struct WindowSlots {
    slots: [WindowSlot; 2],
    window_tracker: SlotId,
    click_tracker: SlotId,
    opens: u32,
}

impl WindowSlots {
    pub fn new() -> Self {
        Self {
            slots: [WindowSlot::closed(), WindowSlot::closed()],
            window_tracker: SlotId::First,
            click_tracker: SlotId::First,
            opens: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn slot(&self, id: SlotId) -> &WindowSlot {
        &self.slots[id.index()]
    }

    pub fn window_tracker(&self) -> SlotId {
        self.window_tracker
    }

    pub fn click_tracker(&self) -> SlotId {
        self.click_tracker
    }

    /// Window the next click would be credited to, if one is waiting.
    pub fn awaiting_click(&self) -> Option<ActiveWindow> {
        let slot = self.slot(self.click_tracker);
        slot.is_pending().then(|| ActiveWindow {
            slot: self.click_tracker,
            bar: slot.bar,
            target_beat: slot.target_beat,
        })
    }

    pub fn open(&mut self, bar: usize, target_beat: usize) -> SlotId {
        let id = self.window_tracker;
        self.opens += 1;
        let slot = &mut self.slots[id.index()];
        if slot.is_pending() {
            warn!(bar, stale_bar = slot.bar, "reopening a slot that never resolved");
        }
        slot.has_clicked = false;
        slot.open_count = self.opens;
        slot.target_beat = target_beat;
        slot.bar = bar;
        self.window_tracker = id.other();
        debug!(?id, bar, target_beat, "window opened");
        id
    }

    /// Accepts at most one click per open window.
    pub fn click(&mut self) -> Option<ActiveWindow> {
        let id = self.click_tracker;
        let slot = &mut self.slots[id.index()];
        if !slot.is_pending() {
            return None;
        }
        slot.has_clicked = true;
        self.click_tracker = id.other();
        Some(ActiveWindow {
            slot: id,
            bar: slot.bar,
            target_beat: slot.target_beat,
        })
    }

    pub fn close(&mut self, bar: usize) -> Result<CloseOutcome, TutorError> {
        if self.slots.iter().all(|slot| slot.open_count == 0) {
            return Err(TutorError::TrackerCorruption { bar });
        }
        // With both slots pending, the one opened first is the one closing.
        let closing = match (self.slots[0].is_pending(), self.slots[1].is_pending()) {
            (true, true) if self.slots[0].open_count < self.slots[1].open_count => SlotId::First,
            (true, true) => SlotId::Second,
            (true, false) => SlotId::First,
            (false, true) => SlotId::Second,
            (false, false) => return Ok(CloseOutcome::AlreadyResolved),
        };
        let slot = &mut self.slots[closing.index()];
        // The pending slot belongs to a later bar, so this bar's window was clicked.
        if slot.bar != bar {
            return Ok(CloseOutcome::AlreadyResolved);
        }
        slot.has_clicked = true;
        let missed = ActiveWindow {
            slot: closing,
            bar,
            target_beat: slot.target_beat,
        };
        if self.click_tracker == closing {
            self.click_tracker = closing.other();
        } else {
            warn!(?closing, bar, "closing a window the click tracker had moved past");
        }
        debug!(?closing, bar, "window closed without a click");
        Ok(CloseOutcome::Missed(missed))
    }
}

impl Default for WindowSlots {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clicks_are_ignored_before_any_window_opens() {
        let mut slots = WindowSlots::new();
        assert!(slots.click().is_none());
        assert!(slots.awaiting_click().is_none());
    }

    #[test]
    fn one_click_per_window() {
        let mut slots = WindowSlots::new();
        slots.open(0, 5);
        let hit = slots.click().unwrap();
        assert_eq!((hit.slot, hit.bar, hit.target_beat), (SlotId::First, 0, 5));
        assert!(slots.click().is_none());
        assert_eq!(slots.close(0).unwrap(), CloseOutcome::AlreadyResolved);
    }

    #[test]
    fn unclicked_window_is_missed_on_close() {
        let mut slots = WindowSlots::new();
        slots.open(0, 5);
        let outcome = slots.close(0).unwrap();
        assert!(matches!(outcome, CloseOutcome::Missed(window) if window.bar == 0));
        assert_eq!(slots.click_tracker(), SlotId::Second);
        assert!(slots.click().is_none());
    }

    #[test]
    fn overlapping_windows_credit_oldest_first() {
        let mut slots = WindowSlots::new();
        slots.open(0, 7);
        slots.open(1, 9);
        assert_eq!(slots.click().unwrap().bar, 0);
        assert_eq!(slots.click().unwrap().bar, 1);
        assert!(slots.click().is_none());
    }

    #[test]
    fn miss_on_older_window_never_steals_later_click() {
        let mut slots = WindowSlots::new();
        slots.open(0, 7);
        slots.open(1, 9);
        assert!(matches!(
            slots.close(0).unwrap(),
            CloseOutcome::Missed(window) if window.bar == 0 && window.slot == SlotId::First
        ));
        let hit = slots.click().unwrap();
        assert_eq!((hit.bar, hit.target_beat), (1, 9));
    }

    #[test]
    fn closing_clicked_window_leaves_later_window_pending() {
        let mut slots = WindowSlots::new();
        slots.open(0, 7);
        slots.open(1, 9);
        assert_eq!(slots.click().unwrap().bar, 0);
        assert_eq!(slots.close(0).unwrap(), CloseOutcome::AlreadyResolved);
        assert_eq!(slots.awaiting_click().unwrap().bar, 1);
        assert!(matches!(
            slots.close(1).unwrap(),
            CloseOutcome::Missed(window) if window.bar == 1
        ));
    }

    #[test]
    fn close_without_open_is_corruption() {
        let mut slots = WindowSlots::new();
        assert!(matches!(
            slots.close(0),
            Err(TutorError::TrackerCorruption { bar: 0 })
        ));
    }

    #[test]
    fn trackers_alternate_over_a_cycle() {
        let mut slots = WindowSlots::new();
        let mut opened = Vec::new();
        let mut credited = Vec::new();
        for bar in 0..4 {
            credited.push(slots.click_tracker());
            opened.push(slots.open(bar, bar * 8 + 4));
            if bar % 2 == 0 {
                slots.click().unwrap();
                assert_eq!(slots.close(bar).unwrap(), CloseOutcome::AlreadyResolved);
            } else {
                assert!(matches!(slots.close(bar).unwrap(), CloseOutcome::Missed(_)));
            }
        }
        let expected = vec![SlotId::First, SlotId::Second, SlotId::First, SlotId::Second];
        assert_eq!(opened, expected);
        assert_eq!(credited, expected);
        assert_eq!(slots.slot(SlotId::First).open_count, 3);
        assert_eq!(slots.slot(SlotId::Second).open_count, 4);
    }

    #[test]
    fn reset_clears_slots() {
        let mut slots = WindowSlots::new();
        slots.open(0, 3);
        slots.reset();
        assert_eq!(slots.window_tracker(), SlotId::First);
        assert!(slots.click().is_none());
    }
}
