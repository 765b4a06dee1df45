// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::fmt;
use core::time::Duration;

use crate::reactor::{Core, Reactor};
use crate::time::Instant;

/// A callback that fires once the [`Reactor`]'s clock reaches a deadline.
///
/// A timer does nothing until it is [armed][Timer::arm]. Arming an already
/// armed timer moves its deadline, and a timer that already fired may be armed
/// again. Dropping a timer cancels it.
///
/// The callback runs on the reactor's thread from within its run loop, never
/// from within [`arm`][Timer::arm] itself, even when the deadline already
/// passed.
pub struct Timer {
    core: Weak<Core>,
    entry: Rc<Entry>,
    key: Option<Key>,
}

/// Deadline-ordered set of armed timers owned by the reactor.
#[derive(Default)]
pub(crate) struct TimerQueue {
    entries: BTreeMap<Key, Rc<Entry>>,
    next_seq: u64,
}

/// Entries with equal deadlines fire in the order they were armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Key {
    deadline: Instant,
    seq: u64,
}

pub(crate) struct Entry {
    callback: RefCell<Box<dyn FnMut()>>,
}

// === impl Timer ===

impl Timer {
    pub fn new<F>(reactor: &Reactor, callback: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self {
            core: reactor.downgrade(),
            entry: Rc::new(Entry::new(callback)),
            key: None,
        }
    }

    /// Arm the timer to fire at `deadline`, replacing any previous deadline.
    ///
    /// If the reactor this timer was created for is gone, the timer stays
    /// disarmed.
    pub fn arm(&mut self, deadline: Instant) {
        self.cancel();

        let Some(core) = self.core.upgrade() else {
            tracing::warn!(?deadline, "tried to arm a timer of a dropped reactor");
            return;
        };

        let key = core.timers.borrow_mut().insert(deadline, self.entry.clone());
        tracing::trace!(?deadline, seq = key.seq, "armed timer");
        self.key = Some(key);
    }

    /// Arm the timer to fire `delay` after the reactor's current time.
    pub fn arm_after(&mut self, delay: Duration) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let deadline = core.clock.now() + delay;
        drop(core);

        self.arm(deadline);
    }

    /// Returns the deadline this timer is armed for, `None` if it is not armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.key
            .filter(|_| self.is_armed())
            .map(|key| key.deadline)
    }

    /// Returns `true` if the timer is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        let (Some(key), Some(core)) = (self.key, self.core.upgrade()) else {
            return false;
        };

        core.timers.borrow().contains(&key)
    }

    /// Disarm the timer.
    ///
    /// Returns `true` if the timer was armed and this call prevented it from
    /// firing, `false` if it was not armed or already fired.
    pub fn cancel(&mut self) -> bool {
        let (Some(key), Some(core)) = (self.key.take(), self.core.upgrade()) else {
            return false;
        };

        let cancelled = core.timers.borrow_mut().remove(&key);
        tracing::trace!(deadline = ?key.deadline, seq = key.seq, cancelled, "cancel timer");
        cancelled
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// === impl TimerQueue ===

impl TimerQueue {
    pub(crate) fn insert(&mut self, deadline: Instant, entry: Rc<Entry>) -> Key {
        let key = Key {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, entry);
        key
    }

    pub(crate) fn remove(&mut self, key: &Key) -> bool {
        self.entries.remove(key).is_some()
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.first_key_value().map(|(key, _)| key.deadline)
    }

    /// Remove and return the earliest entry if its deadline is at or before `now`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<Rc<Entry>> {
        let entry = self.entries.first_entry()?;
        if entry.key().deadline > now {
            return None;
        }

        Some(entry.remove())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("armed", &self.entries.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

// === impl Entry ===

impl Entry {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self {
            callback: RefCell::new(Box::new(callback)),
        }
    }

    pub(crate) fn fire(&self) {
        let mut callback = self.callback.borrow_mut();
        (callback)();
    }
}
