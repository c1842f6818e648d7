use std::collections::HashSet;

/// Process-local suppression of duplicate publishes.
///
/// An id in the tracker is never re-published within this process's
/// lifetime. State is not persisted: a restart clears it, which is the
/// system's accepted at-least-once boundary. The poller loop is single
/// threaded, so check-then-insert needs no locking; a parallel poller would
/// have to add mutual exclusion around it.
pub trait CartTracker: Send {
    fn seen(&self, cart_id: i64) -> bool;
    fn mark_seen(&mut self, cart_id: i64);
}

#[derive(Default)]
pub struct InMemoryTracker {
    seen: HashSet<i64>,
}

impl CartTracker for InMemoryTracker {
    fn seen(&self, cart_id: i64) -> bool {
        self.seen.contains(&cart_id)
    }

    fn mark_seen(&mut self, cart_id: i64) {
        self.seen.insert(cart_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_marked_ids() {
        let mut tracker = InMemoryTracker::default();
        assert!(!tracker.seen(1));

        tracker.mark_seen(1);
        assert!(tracker.seen(1));
        assert!(!tracker.seen(2));

        // marking twice is harmless
        tracker.mark_seen(1);
        assert!(tracker.seen(1));
    }
}
