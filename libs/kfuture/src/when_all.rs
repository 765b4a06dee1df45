// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Waiting for a group of futures.
//!
//! Both [`when_all`] and [`when_all_iter`] hand back the input futures
//! themselves once every one of them is ready, in their original positions. The
//! aggregate never fails, a failed input shows up as a failed future in its
//! slot and it is up to the caller to inspect it.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::mem;

use crate::future::{Future, Promise, pair};
use crate::reactor::Core;

/// A group of futures that can be waited on as a whole, see [`when_all`].
///
/// Implemented for tuples of up to eight futures with arbitrary value types.
pub trait WhenAll {
    type Output;

    fn when_all(self) -> Future<Self::Output>;
}

/// Wait for every future of a tuple to become ready.
///
/// The returned future resolves with the same tuple, every element now ready.
/// If all elements are ready already, so is the returned future.
///
/// # Panics
///
/// Panics if one of the futures was already `.await`ed to completion.
///
/// ```
/// # use kfuture::{Future, when_all};
/// let (a, b) = when_all((Future::ready(1), Future::ready("two"))).get().unwrap();
/// assert_eq!(a.get().unwrap(), 1);
/// assert_eq!(b.get().unwrap(), "two");
/// ```
pub fn when_all<F: WhenAll>(futures: F) -> Future<F::Output> {
    futures.when_all()
}

/// Wait for every future yielded by `futures` to become ready.
///
/// The returned future resolves with all futures collected into a `Vec`, in
/// the order they were yielded.
///
/// # Panics
///
/// Panics if one of the futures was already `.await`ed to completion.
pub fn when_all_iter<I, T>(futures: I) -> Future<Vec<Future<T>>>
where
    I: IntoIterator<Item = Future<T>>,
    T: 'static,
{
    let mut slots: Vec<Future<T>> = futures.into_iter().collect();

    let pending: Vec<(usize, Future<T>)> = slots
        .iter_mut()
        .enumerate()
        .filter_map(|(idx, slot)| take_pending(slot).map(|pending| (idx, pending)))
        .collect();

    let Some(reactor) = pending.first().map(|(_, first)| first.reactor()) else {
        return Future::ready(slots);
    };

    tracing::trace!(total = slots.len(), pending = pending.len(), "when_all_iter");
    let (joined, future) = Joined::new(slots, reactor);
    for (idx, pending) in pending {
        let joined = joined.clone();
        pending.on_ready(move |outcome| {
            joined.fill(|slots| slots[idx] = Future::from_result(outcome));
        });
    }

    future
}

/// Moves `slot` out if it is still pending, leaving an empty placeholder.
fn take_pending<T>(slot: &mut Future<T>) -> Option<Future<T>> {
    if slot.is_ready() {
        None
    } else {
        Some(mem::replace(slot, Future::claimed()))
    }
}

/// The slots of an aggregate, shared by the continuations of all pending
/// inputs. Resolves the aggregate when the last continuation drops it.
struct Joined<S> {
    slots: RefCell<Option<S>>,
    promise: Option<Promise<S>>,
}

// === impl Joined ===

impl<S> Joined<S> {
    fn new(slots: S, reactor: Weak<Core>) -> (Rc<Self>, Future<S>) {
        let (promise, future) = pair(reactor);
        let this = Rc::new(Self {
            slots: RefCell::new(Some(slots)),
            promise: Some(promise),
        });
        (this, future)
    }

    fn fill(&self, f: impl FnOnce(&mut S)) {
        if let Some(slots) = self.slots.borrow_mut().as_mut() {
            f(slots);
        }
    }
}

impl<S> Drop for Joined<S> {
    fn drop(&mut self) {
        if let (Some(promise), Some(slots)) = (self.promise.take(), self.slots.get_mut().take()) {
            promise.set_value(slots);
        }
    }
}

macro_rules! when_all_tuple {
    ($($T:ident $pending:ident $idx:tt),+) => {
        impl<$($T: 'static),+> WhenAll for ($(Future<$T>,)+) {
            type Output = ($(Future<$T>,)+);

            fn when_all(self) -> Future<Self::Output> {
                let mut slots = self;
                $(let $pending = take_pending(&mut slots.$idx);)+

                let reactor = [$($pending.as_ref().map(Future::reactor)),+]
                    .into_iter()
                    .flatten()
                    .next();
                let Some(reactor) = reactor else {
                    return Future::ready(slots);
                };

                let (joined, future) = Joined::new(slots, reactor);
                $(
                    if let Some(pending) = $pending {
                        let joined = joined.clone();
                        pending.on_ready(move |outcome| {
                            joined.fill(|slots| slots.$idx = Future::from_result(outcome));
                        });
                    }
                )+

                future
            }
        }
    };
}

when_all_tuple!(A a 0);
when_all_tuple!(A a 0, B b 1);
when_all_tuple!(A a 0, B b 1, C c 2);
when_all_tuple!(A a 0, B b 1, C c 2, D d 3);
when_all_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4);
when_all_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5);
when_all_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6);
when_all_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6, H h 7);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{later, promise};
    use crate::test_util::{init_tracing, test_reactor};
    use anyhow::anyhow;
    use proptest::prelude::*;

    #[test]
    fn ready_tuple_is_ready() {
        let fut = when_all((Future::ready(1u8), Future::ready(2u16), crate::now()));
        assert!(fut.is_ready());

        let (a, b, c) = fut.get().unwrap();
        assert_eq!(a.get().unwrap(), 1);
        assert_eq!(b.get().unwrap(), 2);
        c.get().unwrap();
    }

    #[test]
    fn waits_for_every_element() {
        let _trace = init_tracing();
        let (_clock, rt) = test_reactor();
        let (p1, f1) = promise::<u32>(&rt);
        let (p2, f2) = promise::<String>(&rt);

        let fut = when_all((f1, Future::ready('x'), f2));
        assert!(!fut.is_ready());

        p2.set_value("second".to_string());
        rt.run_until_stalled();
        assert!(!fut.is_ready());

        p1.set_value(1);
        let (a, b, c) = rt.run_until(fut).unwrap();
        assert_eq!(a.get().unwrap(), 1);
        assert_eq!(b.get().unwrap(), 'x');
        assert_eq!(c.get().unwrap(), "second");
    }

    #[test]
    fn failed_element_does_not_fail_aggregate() {
        let (_clock, rt) = test_reactor();

        let failing = later(&rt).then(|()| Future::<u32>::error(anyhow!("element failed")));
        let fut = when_all((failing, later(&rt).map(|()| 5u32)));

        let (a, b) = rt.run_until(fut).unwrap();
        assert_eq!(a.get().unwrap_err().to_string(), "element failed");
        assert_eq!(b.get().unwrap(), 5);
    }

    #[test]
    fn single_and_eight_tuples() {
        let (_clock, rt) = test_reactor();

        let (only,) = rt.run_until(when_all((later(&rt),))).unwrap();
        only.get().unwrap();

        let fut = when_all((
            Future::ready(0),
            later(&rt).map(|()| 1),
            Future::ready(2),
            later(&rt).map(|()| 3),
            Future::ready(4),
            later(&rt).map(|()| 5),
            Future::ready(6),
            later(&rt).map(|()| 7),
        ));
        let (a, b, c, d, e, f, g, h) = rt.run_until(fut).unwrap();
        let values = [a, b, c, d, e, f, g, h].map(|fut| fut.get().unwrap());
        assert_eq!(values, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn empty_iter() {
        let fut = when_all_iter(core::iter::empty::<Future<u32>>());
        assert!(fut.get().unwrap().is_empty());
    }

    #[test]
    fn iter_resolved_in_reverse_keeps_positions() {
        let (_clock, rt) = test_reactor();
        let (promises, futures): (Vec<_>, Vec<_>) = (0..5).map(|_| promise::<usize>(&rt)).unzip();

        let fut = when_all_iter(futures);
        for (i, promise) in promises.into_iter().enumerate().rev() {
            promise.set_value(i * 10);
            rt.run_until_stalled();
        }

        let values: Vec<_> = rt
            .run_until(fut)
            .unwrap()
            .into_iter()
            .map(|fut| fut.get().unwrap())
            .collect();
        assert_eq!(values, [0, 10, 20, 30, 40]);
    }

    #[test]
    fn iter_with_broken_promise() {
        let (_clock, rt) = test_reactor();
        let (promise, broken) = promise::<u32>(&rt);
        let fut = when_all_iter([Future::ready(1), broken]);

        drop(promise);
        let mut slots = rt.run_until(fut).unwrap().into_iter();
        assert_eq!(slots.next().unwrap().get().unwrap(), 1);
        let err = slots.next().unwrap().get().unwrap_err();
        assert!(err.downcast_ref::<crate::BrokenPromise>().is_some());
    }

    #[test]
    #[should_panic(expected = "polled to completion")]
    fn completed_by_poll_is_rejected() {
        use core::future::Future as _;
        use core::pin::Pin;
        use core::task::Context;

        let (_clock, rt) = test_reactor();
        let (promise, mut polled) = promise::<u32>(&rt);
        promise.set_value(1);

        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        assert!(Pin::new(&mut polled).poll(&mut cx).is_ready());
        let _ = when_all_iter([Future::ready(0), polled]);
    }

    proptest! {
        #[test]
        fn iter_preserves_order(items in proptest::collection::vec((any::<u32>(), 0u8..3), 0..64)) {
            let (_clock, rt) = test_reactor();

            let futures = items.iter().map(|&(value, delay)| {
                let mut fut = Future::ready(());
                for _ in 0..delay {
                    let rt = rt.clone();
                    fut = fut.then(move |()| later(&rt));
                }
                fut.map(move |()| value)
            });

            let values: Vec<u32> = rt
                .run_until(when_all_iter(futures))
                .unwrap()
                .into_iter()
                .map(|fut| fut.get().unwrap())
                .collect();
            let expected: Vec<u32> = items.iter().map(|&(value, _)| value).collect();
            prop_assert_eq!(values, expected);
        }
    }
}
