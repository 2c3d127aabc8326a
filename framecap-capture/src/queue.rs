//! Bounded hand-off queue between producer threads and the writer.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// What `offer` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Wait for room. A closed queue releases waiting producers.
    #[default]
    Block,
    /// Evict the oldest queued item.
    DropOldest,
    /// Reject the offered item.
    DropNewest,
}

/// Result of [`BoundedQueue::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The item was queued.
    Queued,
    /// The item was queued after evicting the oldest one.
    Evicted,
    /// The queue was full and the item was dropped.
    Rejected,
    /// The queue is closed.
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A FIFO with a fixed capacity and an overflow policy.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Items lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Add an item, applying the overflow policy if the queue is full.
    pub fn offer(&self, item: T) -> Offer {
        let mut state = self.state.lock();
        let mut outcome = Offer::Queued;
        loop {
            if state.closed {
                return Offer::Closed;
            }
            if state.items.len() < self.capacity {
                break;
            }
            match self.policy {
                OverflowPolicy::Block => self.not_full.wait(&mut state),
                OverflowPolicy::DropOldest => {
                    state.items.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    outcome = Offer::Evicted;
                }
                OverflowPolicy::DropNewest => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return Offer::Rejected;
                }
            }
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        outcome
    }

    /// Remove the oldest item, waiting for one to arrive.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Remove the oldest item if it satisfies `pred`, without waiting.
    pub fn take_if(&self, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let mut state = self.state.lock();
        if !state.items.front().map_or(false, pred) {
            return None;
        }
        let item = state.items.pop_front();
        drop(state);
        self.not_full.notify_one();
        item
    }

    /// Refuse further items and wake every waiting thread.
    ///
    /// Items already queued can still be taken.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}
