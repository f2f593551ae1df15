use beatwise_domain::StateKey;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::analytics::EndReason;

/// Notifications published to audio and GUI collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A cycle started on this state.
    NewState {
        key: StateKey,
        bpm: f32,
        instruments: Vec<u8>,
    },
    /// The given bar is now current; `next_beat` is the following bar's target.
    NewBeat {
        bar: usize,
        beat: usize,
        next_beat: Option<usize>,
    },
    NewErrorValue {
        bar: usize,
        beat: usize,
        score: f64,
    },
    CycleFinished {
        key: StateKey,
        visit_average: Option<f64>,
    },
    SessionEnded {
        reason: EndReason,
    },
}

#[derive(Debug, Clone)]
pub struct EventSink {
    sender: UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.sender.send(event) {
            trace!(event = ?err.0, "no listener for session event");
        }
    }
}
