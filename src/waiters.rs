use std::collections::BTreeMap;

use tokio::sync::oneshot;

/// One parked caller awaiting admission
#[derive(Debug)]
struct Waiter {
    enqueued_at_nanos: u64,
    /// One-shot suspension handle, consumed exactly once on admission
    tx: oneshot::Sender<()>,
}

/// Strictly FIFO queue of parked callers for one group
///
/// Keyed by a per-queue monotonic id, so enqueue order is total and the head
/// is always the oldest waiter. Removal on timeout or cancellation is a
/// first-class O(log n) operation that leaves the ordering of the remaining
/// waiters untouched.
///
/// Only the group's own worker pops waiters; external callers never reach
/// past the head, which is what preserves admission order under contention.
#[derive(Debug, Default)]
pub(crate) struct WaiterQueue {
    entries: BTreeMap<u64, Waiter>,
    next_id: u64,
}

impl WaiterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a new caller; returns its id and the handle it suspends on
    pub fn enqueue(&mut self, now_nanos: u64) -> (u64, oneshot::Receiver<()>) {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, Waiter { enqueued_at_nanos: now_nanos, tx });
        (id, rx)
    }

    /// Remove a parked caller (timeout or cancellation)
    ///
    /// Returns false if the waiter was already admitted; the caller then
    /// owns a signalled receiver and must treat the acquire as granted.
    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Admit the head waiter, consuming its handle
    ///
    /// Must be called with the group lock held: popping and signalling
    /// together under the lock is what lets a racing canceller conclude
    /// "absent from the queue" means "already admitted".
    pub fn admit_head(&mut self) -> bool {
        match self.entries.pop_first() {
            Some((_, waiter)) => {
                // Send fails only if the caller's future was dropped after
                // its queue entry was already popped; the slot is spent
                // either way.
                let _ = waiter.tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enqueue time of the oldest waiter, if any
    pub fn oldest_enqueued_nanos(&self) -> Option<u64> {
        self.entries.first_key_value().map(|(_, w)| w.enqueued_at_nanos)
    }

    /// Drop all waiters without signalling them (shutdown path)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
