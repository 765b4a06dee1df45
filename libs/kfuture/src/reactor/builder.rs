// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::cell::RefCell;
use core::fmt;

use crate::budget::Budget;
use crate::reactor::{Core, DEFAULT_TASK_QUOTA, DEFAULT_TICK_BATCH, Reactor};
use crate::time::{Clock, StdClock, TimerQueue};

/// Configures and constructs a [`Reactor`].
pub struct Builder {
    budget: Budget,
    tick_batch: usize,
    clock: Option<Box<dyn Clock>>,
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            budget: Budget::steps(DEFAULT_TASK_QUOTA),
            tick_batch: DEFAULT_TICK_BATCH,
            clock: None,
        }
    }

    /// Override the number of synchronous steps a task may take before loop
    /// combinators yield back to the run loop.
    ///
    /// By default, tasks get [`DEFAULT_TASK_QUOTA`] steps.
    #[must_use]
    pub fn task_quota(mut self, steps: u32) -> Self {
        self.budget = Budget::steps(steps);
        self
    }

    /// Never ask loop combinators to yield.
    ///
    /// Loops over ready futures then run to completion synchronously. They
    /// still do so without growing the stack, but monopolize the thread.
    #[must_use]
    pub fn unlimited_budget(mut self) -> Self {
        self.budget = Budget::unlimited();
        self
    }

    /// Override the maximum number of tasks run by a single [`Reactor::tick`].
    ///
    /// By default, [`DEFAULT_TICK_BATCH`] tasks are run per tick.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[must_use]
    pub fn tick_batch(mut self, n: usize) -> Self {
        assert!(n > 0, "tick batch size must be non-zero");
        self.tick_batch = n;
        self
    }

    /// Override the clock timers are driven by.
    ///
    /// By default, reactors use a [`StdClock`].
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    #[must_use]
    pub fn build(self) -> Reactor {
        let clock = self.clock.unwrap_or_else(|| Box::new(StdClock::new()));

        tracing::debug!(
            quota = ?self.budget.quota(),
            tick_batch = self.tick_batch,
            "building reactor"
        );

        Reactor::from_core(Core {
            run_queue: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerQueue::default()),
            budget: self.budget,
            clock,
            tick_batch: self.tick_batch,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("budget", &self.budget)
            .field("tick_batch", &self.tick_batch)
            .field("has_clock", &self.clock.is_some())
            .finish()
    }
}
