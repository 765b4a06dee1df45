// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cooperative work budget.
//!
//! Every loop combinator in this crate may complete an arbitrary number of
//! steps synchronously when the futures it is handed are already ready. To keep
//! such a loop from starving other tasks (and from growing the native stack in
//! the naive recursive formulation), each synchronous step consumes one unit
//! of the reactor's [`Budget`]. Once the budget is exhausted the loop packs up
//! its remaining work into a task, puts it at the back of the run queue and
//! returns.
//!
//! The reactor refills the budget before it runs each task or timer callback.

use core::cell::Cell;

/// A per-task quota of synchronous steps.
#[derive(Debug)]
pub struct Budget {
    quota: Option<u32>,
    remaining: Cell<u32>,
}

impl Budget {
    /// Construct a budget that allows `quota` synchronous steps between
    /// refills. A quota of zero forces a yield after every step.
    #[must_use]
    pub const fn steps(quota: u32) -> Self {
        Self {
            quota: Some(quota),
            remaining: Cell::new(quota),
        }
    }

    /// Construct a budget that never runs out.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            quota: None,
            remaining: Cell::new(u32::MAX),
        }
    }

    /// Returns the configured quota or `None` if the budget is unlimited.
    pub fn quota(&self) -> Option<u32> {
        self.quota
    }

    /// Returns the number of steps left before the budget is exhausted.
    pub fn remaining(&self) -> u32 {
        self.remaining.get()
    }

    /// Consume one step, returning `true` if the caller must yield.
    pub fn consume(&self) -> bool {
        if self.quota.is_none() {
            return false;
        }

        match self.remaining.get().checked_sub(1) {
            Some(remaining) => {
                self.remaining.set(remaining);
                remaining == 0
            }
            None => true,
        }
    }

    /// Refill the budget back up to its quota.
    pub fn refill(&self) {
        if let Some(quota) = self.quota {
            self.remaining.set(quota);
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::steps(crate::reactor::DEFAULT_TASK_QUOTA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_quota() {
        let budget = Budget::steps(3);

        assert!(!budget.consume());
        assert!(!budget.consume());
        assert!(budget.consume());
        // stays exhausted until refilled
        assert!(budget.consume());
        assert_eq!(budget.remaining(), 0);

        budget.refill();
        assert_eq!(budget.remaining(), 3);
        assert!(!budget.consume());
    }

    #[test]
    fn zero_quota_always_yields() {
        let budget = Budget::steps(0);
        assert!(budget.consume());
        budget.refill();
        assert!(budget.consume());
    }

    #[test]
    fn unlimited_never_yields() {
        let budget = Budget::unlimited();
        for _ in 0..10_000 {
            assert!(!budget.consume());
        }
        assert_eq!(budget.quota(), None);
    }
}
