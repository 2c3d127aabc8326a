//! Session notifications.

use crossbeam::channel::{unbounded, Receiver, Sender};
use framecap_core::Rational;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Idle,
    Recording,
    Done,
    Failed,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::Idle => "idle",
            State::Recording => "recording",
            State::Done => "done",
            State::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something a subscriber may want to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: State, to: State },
    SegmentOpened { index: usize, name: String },
    /// Emitted once the segment file is complete.
    SegmentClosed {
        index: usize,
        name: String,
        durations: Vec<Rational>,
    },
    /// A queue lost items. `total` counts all losses of that queue so far.
    BuffersDropped { queue: &'static str, total: u64 },
    Failure { message: String },
}

/// Fan-out of [`SessionEvent`]s to any number of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event`, forgetting subscribers that hung up.
    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(?event, "session event");
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_live_subscribers() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        drop(b);

        bus.publish(SessionEvent::Failure {
            message: "disk full".into(),
        });
        assert_eq!(
            a.try_recv().unwrap(),
            SessionEvent::Failure {
                message: "disk full".into()
            }
        );
        assert_eq!(bus.subscribers.lock().len(), 1);
    }
}
