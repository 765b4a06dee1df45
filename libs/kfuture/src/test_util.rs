// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::rc::Rc;
use alloc::sync::Arc;
use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::reactor::Reactor;
use crate::time::{Clock, Instant};

/// A clock that only moves when told to.
///
/// Parking on it jumps straight to the deadline, so tests that wait on timers
/// run instantly and deterministically.
#[derive(Clone, Debug, Default)]
pub struct MockClock {
    now: Rc<Cell<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn now(&self) -> Instant {
        Instant::from_duration(self.now.get())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        MockClock::now(self)
    }

    fn park_until(&self, deadline: Instant) {
        tracing::trace!(?deadline, "MockClock::park_until");
        if deadline.as_duration() > self.now.get() {
            self.now.set(deadline.as_duration());
        }
    }
}

/// A reactor driven by a [`MockClock`], with the default budget.
pub fn test_reactor() -> (MockClock, Reactor) {
    let clock = MockClock::new();
    let reactor = Reactor::builder().clock(clock.clone()).build();
    (clock, reactor)
}

#[must_use]
pub fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// Counts warnings and errors logged on this thread while the guard is alive.
#[must_use]
pub fn count_warnings() -> (WarnCounter, tracing::subscriber::DefaultGuard) {
    let counter = WarnCounter::default();
    let guard = tracing_subscriber::registry()
        .with(counter.clone())
        .set_default();
    (counter, guard)
}

#[derive(Clone, Debug, Default)]
pub struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= Level::WARN {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}
