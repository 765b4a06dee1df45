// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single-threaded cooperative run loop.
//!
//! A [`Reactor`] owns a FIFO run queue of [`Task`]s, a deadline-ordered timer
//! queue and the [`Budget`] that loop combinators consult to decide whether to
//! keep going synchronously or yield. It is the scheduler every [`Promise`]
//! hands its continuation to once it gets resolved.
//!
//! [`Promise`]: crate::Promise

mod builder;
mod task;

use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::fmt;

pub use builder::Builder;
pub use task::{Id, Task};

use crate::budget::Budget;
use crate::error::{Result, Stalled};
use crate::future::Future;
use crate::time::{Clock, Instant, TimerQueue};

/// Number of synchronous steps a task may take before loop combinators yield.
pub const DEFAULT_TASK_QUOTA: u32 = 256;

/// Maximum number of tasks run by a single [`Reactor::tick`].
pub const DEFAULT_TICK_BATCH: usize = 64;

/// Handle to a single-threaded run loop.
///
/// Handles are cheap to clone, all clones refer to the same run loop.
#[derive(Clone)]
pub struct Reactor {
    core: Rc<Core>,
}

pub(crate) struct Core {
    pub(crate) run_queue: RefCell<VecDeque<Task>>,
    pub(crate) timers: RefCell<TimerQueue>,
    pub(crate) budget: Budget,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) tick_batch: usize,
}

/// Summary of the work done by a call to [`Reactor::tick`] or
/// [`Reactor::run_until_stalled`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// The total number of tasks run.
    pub polled: usize,

    /// The number of timers whose callbacks fired.
    pub timers_fired: usize,

    /// `true` if the tick ended with tasks remaining in the run queue.
    pub has_remaining: bool,
}

// === impl Reactor ===

impl Reactor {
    /// Construct a reactor with the default configuration and a [`StdClock`].
    ///
    /// [`StdClock`]: crate::time::StdClock
    #[must_use]
    pub fn new() -> Self {
        Builder::new().build()
    }

    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn from_core(core: Core) -> Self {
        Self {
            core: Rc::new(core),
        }
    }

    pub(crate) fn from_weak(core: &Weak<Core>) -> Option<Self> {
        core.upgrade().map(|core| Self { core })
    }

    pub(crate) fn core(&self) -> &Core {
        &self.core
    }

    pub(crate) fn downgrade(&self) -> Weak<Core> {
        Rc::downgrade(&self.core)
    }

    /// Returns the current time of this reactor's clock.
    pub fn now(&self) -> Instant {
        self.core.clock.now()
    }

    /// Returns the budget loop combinators running on this reactor consume.
    pub fn budget(&self) -> &Budget {
        &self.core.budget
    }

    /// Consume one step of the current task's budget, returning `true` if the
    /// caller should stop and yield back to the run loop.
    pub fn should_yield(&self) -> bool {
        self.core.budget.consume()
    }

    /// Push `task` to the back of the run queue.
    pub fn schedule(&self, task: Task) {
        self.core.schedule(task);
    }

    /// Returns the number of tasks waiting in the run queue.
    pub fn pending_tasks(&self) -> usize {
        self.core.run_queue.borrow().len()
    }

    /// Returns the number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.core.timers.borrow().len()
    }

    /// Returns the deadline of the earliest armed timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.core.timers.borrow().next_deadline()
    }

    /// Fire all expired timers, then run up to the configured batch size of tasks.
    pub fn tick(&self) -> Tick {
        let timers_fired = self.fire_expired(self.now());

        let mut polled = 0;
        while polled < self.core.tick_batch {
            // the borrow has to end before the task runs, tasks schedule more tasks
            let Some(task) = self.core.run_queue.borrow_mut().pop_front() else {
                break;
            };

            self.core.budget.refill();
            task.run();
            polled += 1;
        }

        let has_remaining = !self.core.run_queue.borrow().is_empty();
        tracing::trace!(polled, timers_fired, has_remaining, "tick");

        Tick {
            polled,
            timers_fired,
            has_remaining,
        }
    }

    /// Tick until there are no runnable tasks and no expired timers left.
    ///
    /// Timers that expire later are left armed.
    pub fn run_until_stalled(&self) -> Tick {
        let mut total = Tick::default();

        loop {
            let tick = self.tick();
            total.polled += tick.polled;
            total.timers_fired += tick.timers_fired;

            if !tick.has_remaining && !self.has_expired_timers() {
                return total;
            }
        }
    }

    /// Run until there are no tasks and no armed timers left, parking on the
    /// clock while waiting for the next timer.
    pub fn run(&self) -> Tick {
        let mut total = Tick::default();

        loop {
            let tick = self.run_until_stalled();
            total.polled += tick.polled;
            total.timers_fired += tick.timers_fired;

            match self.next_deadline() {
                Some(deadline) => self.core.clock.park_until(deadline),
                None => return total,
            }
        }
    }

    /// Run until `future` is ready, then claim its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error `future` resolved with, or [`Stalled`] if the reactor
    /// ran out of tasks and timers before `future` became ready.
    pub fn run_until<T>(&self, mut future: Future<T>) -> Result<T> {
        loop {
            future = match future.try_get() {
                Ok(outcome) => return outcome,
                Err(pending) => pending,
            };

            let tick = self.tick();
            if tick.polled > 0 || tick.timers_fired > 0 {
                continue;
            }

            match self.next_deadline() {
                Some(deadline) => self.core.clock.park_until(deadline),
                None => {
                    tracing::debug!("run queue and timers drained, future still pending");
                    return Err(Stalled(()).into());
                }
            }
        }
    }

    fn has_expired_timers(&self) -> bool {
        self.next_deadline()
            .is_some_and(|deadline| deadline <= self.now())
    }

    fn fire_expired(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let Some(entry) = self.core.timers.borrow_mut().pop_expired(now) else {
                return fired;
            };

            tracing::trace!(?now, "firing timer");
            self.core.budget.refill();
            entry.fire();
            fired += 1;
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("run_queue", &self.core.run_queue.borrow().len())
            .field("timers", &*self.core.timers.borrow())
            .field("budget", &self.core.budget)
            .field("tick_batch", &self.core.tick_batch)
            .finish_non_exhaustive()
    }
}

// === impl Core ===

impl Core {
    pub(crate) fn schedule(&self, task: Task) {
        tracing::trace!(task.tid = task.id().as_u64(), "schedule");
        self.run_queue.borrow_mut().push_back(task);
    }
}
