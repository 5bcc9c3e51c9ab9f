//! Bounded in-memory ring of recent stream events, for diagnostics only.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use ag_runner::ToolEvent;

/// Default ring capacity.
pub const RING_CAPACITY: usize = 512;

pub struct EventRing {
    capacity: usize,
    inner: Mutex<RingInner>,
}

struct RingInner {
    events: VecDeque<(DateTime<Utc>, ToolEvent)>,
    total: u64,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RingInner {
                events: VecDeque::new(),
                total: 0,
            }),
        }
    }

    pub fn push(&self, event: ToolEvent) {
        let mut inner = self.inner.lock();
        if inner.events.len() == self.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back((Utc::now(), event));
        inner.total += 1;
    }

    /// Oldest-first snapshot of the retained events.
    pub fn snapshot(&self) -> Vec<(DateTime<Utc>, ToolEvent)> {
        self.inner.lock().events.iter().cloned().collect()
    }

    /// Events pushed over the process lifetime (not just retained).
    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(n: usize) -> ToolEvent {
        ToolEvent::TextResponse { text: format!("event {n}") }
    }

    #[test]
    fn keeps_only_the_newest_capacity_events() {
        let ring = EventRing::new(3);
        for n in 0..5 {
            ring.push(text(n));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.total(), 5);

        let kept: Vec<ToolEvent> =
            ring.snapshot().into_iter().map(|(_, e)| e).collect();
        assert_eq!(kept, vec![text(2), text(3), text(4)]);
    }

    #[test]
    fn empty_ring() {
        let ring = EventRing::default();
        assert!(ring.is_empty());
        assert_eq!(ring.total(), 0);
    }
}
