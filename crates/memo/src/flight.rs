//! In-flight construction slots
//!
//! A [`Flight`] is installed under the cache's structural lock by the first
//! caller to miss on a key. Later callers for the same key clone the slot,
//! release the structural lock and block here until the first caller
//! publishes its outcome.

use crate::error::Result;
use parking_lot::{Condvar, Mutex};

enum Slot<V> {
    Pending,
    Done(Result<V>),
    Abandoned,
}

pub(crate) struct Flight<V> {
    slot: Mutex<Slot<V>>,
    ready: Condvar,
}

impl<V> Flight<V> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    /// Publish the construction outcome and wake every waiter.
    pub(crate) fn complete(&self, outcome: Result<V>) {
        *self.slot.lock() = Slot::Done(outcome);
        self.ready.notify_all();
    }

    /// Release waiters without an outcome. No-op once completed.
    pub(crate) fn abandon(&self) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Abandoned;
            drop(slot);
            self.ready.notify_all();
        }
    }
}

impl<V: Clone> Flight<V> {
    /// Block until the outcome is published.
    ///
    /// Returns `None` when the constructing caller gave up (it panicked), in
    /// which case the waiter should retry the lookup.
    pub(crate) fn wait(&self) -> Option<Result<V>> {
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.ready.wait(&mut slot);
        }
        match &*slot {
            Slot::Done(outcome) => Some(outcome.clone()),
            Slot::Pending | Slot::Abandoned => None,
        }
    }
}
