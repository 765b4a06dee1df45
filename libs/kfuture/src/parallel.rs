// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::error::Error;
use crate::future::{Future, Futurize, Promise, promise};
use crate::reactor::Reactor;

/// Call `action` for every item of `iterable` without waiting in between, and
/// wait for all of the returned futures.
///
/// Every item is passed to `action` before this function returns, even if some
/// of the earlier calls already failed. The returned future resolves once all
/// futures returned by `action` resolved. It fails with the first error that
/// was observed, every further error is discarded.
///
/// If all futures are ready by the time `action` returns them, so is the
/// returned future and nothing is allocated.
pub fn parallel_for_each<I, A, R>(reactor: &Reactor, iterable: I, mut action: A) -> Future<()>
where
    I: IntoIterator,
    A: FnMut(I::Item) -> R,
    R: Futurize<Output = ()>,
{
    let mut first_error: Option<Error> = None;
    let mut joined: Option<(Rc<Completion>, Future<()>)> = None;

    for item in iterable {
        match action(item).futurize().try_get() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => record(&mut first_error, err),
            Err(pending) => {
                let (completion, _) = joined.get_or_insert_with(|| Completion::new(reactor));
                let completion = completion.clone();
                pending.on_ready(move |outcome| {
                    if let Err(err) = outcome {
                        completion.fail(err);
                    }
                });
            }
        }
    }

    match joined {
        None => Future::from_result(first_error.map_or(Ok(()), Err)),
        Some((completion, future)) => {
            if let Some(err) = first_error {
                completion.fail(err);
            }
            // the last pending future to resolve drops the final reference
            drop(completion);
            future
        }
    }
}

fn record(slot: &mut Option<Error>, err: Error) {
    if slot.is_none() {
        *slot = Some(err);
    } else {
        tracing::debug!(%err, "discarding error, another one was recorded first");
    }
}

/// Shared by the continuations of all pending futures. Resolves the joined
/// future when dropped.
struct Completion {
    error: RefCell<Option<Error>>,
    promise: Option<Promise<()>>,
}

// === impl Completion ===

impl Completion {
    fn new(reactor: &Reactor) -> (Rc<Self>, Future<()>) {
        let (promise, future) = promise(reactor);
        let this = Rc::new(Self {
            error: RefCell::new(None),
            promise: Some(promise),
        });
        (this, future)
    }

    fn fail(&self, err: Error) {
        record(&mut self.error.borrow_mut(), err);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let Some(promise) = self.promise.take() else {
            return;
        };

        match self.error.get_mut().take() {
            Some(err) => promise.set_error(err),
            None => promise.set_value(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::later;
    use crate::test_util::{count_warnings, init_tracing, test_reactor};
    use anyhow::anyhow;
    use core::cell::Cell;
    use proptest::prelude::*;

    #[test]
    fn all_ready_completes_synchronously() {
        let (_clock, rt) = test_reactor();
        let calls = Cell::new(0);

        let fut = parallel_for_each(&rt, 0..100, |_| {
            calls.set(calls.get() + 1);
            crate::now()
        });

        assert!(fut.is_ready());
        fut.get().unwrap();
        assert_eq!(calls.get(), 100);
        assert_eq!(rt.pending_tasks(), 0);
    }

    #[test]
    fn empty_input() {
        let (_clock, rt) = test_reactor();
        let fut = parallel_for_each(&rt, Vec::<u32>::new(), |_| crate::now());
        fut.get().unwrap();
    }

    #[test]
    fn invokes_everything_before_waiting() {
        let _trace = init_tracing();
        let (_clock, rt) = test_reactor();
        let mut promises = Vec::new();

        let fut = parallel_for_each(&rt, 0..4, |_| {
            let (promise, future) = promise::<()>(&rt);
            promises.push(promise);
            future
        });
        assert_eq!(promises.len(), 4);

        // resolve out of order, the joined future waits for the last one
        for promise in promises.drain(1..) {
            promise.set_value(());
        }
        rt.run_until_stalled();
        assert!(!fut.is_ready());

        promises.pop().unwrap().set_value(());
        rt.run_until(fut).unwrap();
    }

    #[test]
    fn failure_waits_for_the_rest() {
        let (_clock, rt) = test_reactor();
        let (first, first_fut) = promise::<()>(&rt);
        let (second, second_fut) = promise::<()>(&rt);
        let mut futures = vec![first_fut, second_fut].into_iter();

        let fut = parallel_for_each(&rt, 0..2, |_| futures.next().unwrap());

        first.set_error(anyhow!("first failed"));
        rt.run_until_stalled();
        assert!(!fut.is_ready());

        second.set_value(());
        let err = rt.run_until(fut).unwrap_err();
        assert_eq!(err.to_string(), "first failed");
    }

    #[test]
    fn synchronous_failure_keeps_invoking() {
        let (_clock, rt) = test_reactor();
        let calls = Cell::new(0);

        let fut = parallel_for_each(&rt, 0..5, |i| {
            calls.set(calls.get() + 1);
            if i == 1 {
                return Err(anyhow!("item {i} failed"));
            }
            Ok(later(&rt))
        });

        assert_eq!(calls.get(), 5);
        assert_eq!(rt.run_until(fut).unwrap_err().to_string(), "item 1 failed");
    }

    #[test]
    fn reports_first_of_many_errors() {
        let (_clock, rt) = test_reactor();

        let fut = parallel_for_each(&rt, 0..3, |i| {
            later(&rt).then(move |()| Future::<()>::error(anyhow!("error {i}")))
        });

        // continuations run in FIFO order, so the first item fails first
        assert_eq!(rt.run_until(fut).unwrap_err().to_string(), "error 0");
    }

    #[test]
    fn discarded_errors_are_not_reported() {
        let (warnings, _guard) = count_warnings();
        let (_clock, rt) = test_reactor();

        let fut = parallel_for_each(&rt, 0..4, |i| {
            if i == 0 {
                return Err(anyhow!("item {i} failed"));
            }
            Ok(later(&rt).then(move |()| Future::<()>::error(anyhow!("item {i} failed"))))
        });

        assert_eq!(rt.run_until(fut).unwrap_err().to_string(), "item 0 failed");
        rt.run();
        assert_eq!(warnings.get(), 0);

        // an error nobody looked at is still reported
        drop(Future::<()>::error(anyhow!("dropped")));
        assert_eq!(warnings.get(), 1);
    }

    proptest! {
        #[test]
        fn fails_iff_any_item_fails(items in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..32)) {
            let (_clock, rt) = test_reactor();
            let calls = Cell::new(0);

            let fut = parallel_for_each(&rt, items.clone(), |(pending, fails)| {
                calls.set(calls.get() + 1);
                let step = if pending { later(&rt) } else { crate::now() };
                step.then(move |()| {
                    if fails {
                        Future::error(anyhow!("failed"))
                    } else {
                        crate::now()
                    }
                })
            });

            prop_assert_eq!(calls.get(), items.len());
            let outcome = rt.run_until(fut);
            let any_fails = items.iter().any(|(_, fails)| *fails);
            prop_assert_eq!(outcome.is_err(), any_fails);
        }
    }
}
