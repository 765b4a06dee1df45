// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Time keeping for the [`Reactor`][crate::Reactor].

mod sleep;
mod timer;

use core::fmt;
use core::ops::{Add, AddAssign, Sub};
use core::time::Duration;

pub use sleep::sleep;
pub(crate) use timer::TimerQueue;
pub use timer::Timer;

/// A measurement of a monotonically nondecreasing clock.
///
/// Instants are represented as the [`Duration`] elapsed since the epoch of the
/// [`Clock`] that produced them, so they are only meaningful relative to the
/// same clock.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(Duration);

impl Instant {
    /// The epoch of every clock.
    pub const ZERO: Instant = Instant(Duration::ZERO);

    #[must_use]
    pub const fn from_duration(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    /// Returns the amount of time elapsed since the clock's epoch.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn checked_add(&self, duration: Duration) -> Option<Instant> {
        self.0.checked_add(duration).map(Instant)
    }

    /// Returns the amount of time elapsed from another instant to this one, or
    /// zero duration if that instant is later than this one.
    #[must_use]
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    /// # Panics
    ///
    /// This function may panic if the resulting point in time cannot be represented.
    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs)
            .expect("overflow when adding duration to instant")
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instant({:?})", self.0)
    }
}

/// A source of time for a [`Reactor`][crate::Reactor].
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Instant;

    /// Block the calling thread until `deadline` has been reached.
    ///
    /// Called by the reactor when it has no runnable tasks left and is only
    /// waiting for a timer to expire.
    fn park_until(&self, deadline: Instant);
}

/// A [`Clock`] backed by [`std::time::Instant`] that parks by sleeping the
/// current thread.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    anchor: std::time::Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: std::time::Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant(self.anchor.elapsed())
    }

    fn park_until(&self, deadline: Instant) {
        let dur = deadline - self.now();
        if !dur.is_zero() {
            tracing::trace!(?deadline, ?dur, "parking current thread...");
            std::thread::sleep(dur);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_arithmetic() {
        let a = Instant::from_duration(Duration::from_millis(10));
        let b = a + Duration::from_millis(5);

        assert!(b > a);
        assert_eq!(b - a, Duration::from_millis(5));
        // saturates instead of going negative
        assert_eq!(a - b, Duration::ZERO);
        assert_eq!(Instant::ZERO.checked_add(Duration::MAX), Some(Instant(Duration::MAX)));
        assert_eq!(Instant(Duration::MAX).checked_add(Duration::from_secs(1)), None);
    }

    #[test]
    fn std_clock_is_monotonic() {
        let clock = StdClock::new();
        let a = clock.now();
        clock.park_until(a + Duration::from_millis(2));
        let b = clock.now();
        assert!(b - a >= Duration::from_millis(2));
    }
}
