// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::rc::Rc;
use core::time::Duration;

use crate::future::{Future, promise};
use crate::reactor::Reactor;
use crate::time::timer::Entry;

/// Returns a future that resolves once `duration` has elapsed on the reactor's
/// clock.
///
/// The sleep cannot be cancelled; dropping the returned future only discards
/// the wakeup.
pub fn sleep(reactor: &Reactor, duration: Duration) -> Future<()> {
    let deadline = reactor.now() + duration;
    let (promise, future) = promise(reactor);

    let mut promise = Some(promise);
    let entry = Entry::new(move || {
        if let Some(promise) = promise.take() {
            promise.set_value(());
        }
    });

    reactor
        .core()
        .timers
        .borrow_mut()
        .insert(deadline, Rc::new(entry));
    tracing::trace!(?deadline, "sleep");

    future
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_reactor;

    #[test]
    fn resolves_after_duration() {
        let (clock, rt) = test_reactor();

        let fut = sleep(&rt, Duration::from_millis(100));
        rt.run_until_stalled();
        assert!(!fut.is_ready());

        clock.advance(Duration::from_millis(100));
        rt.run_until_stalled();
        assert!(fut.is_ready());
        fut.get().unwrap();
    }

    #[test]
    fn run_until_parks_on_the_clock() {
        let (clock, rt) = test_reactor();

        let fut = sleep(&rt, Duration::from_secs(3)).map(|()| 7);
        assert_eq!(rt.run_until(fut).unwrap(), 7);
        assert_eq!(clock.now().as_duration(), Duration::from_secs(3));
    }
}
