// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::error::{Error, TimedOut};
use crate::future::{Future, Promise, promise};
use crate::reactor::Reactor;
use crate::time::{Instant, Timer};

/// Produces the error a future fails with when [`with_timeout_or`] gives up on
/// it.
///
/// Implemented for every `FnOnce() -> E` closure where `E` converts into an
/// [`Error`].
pub trait TimeoutError {
    fn timeout(self) -> Error;
}

/// Fails with [`TimedOut`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTimeout;

impl TimeoutError for DefaultTimeout {
    fn timeout(self) -> Error {
        TimedOut(()).into()
    }
}

impl<F, E> TimeoutError for F
where
    F: FnOnce() -> E,
    E: Into<Error>,
{
    fn timeout(self) -> Error {
        self().into()
    }
}

/// Wait for `future` until `deadline` at the latest.
///
/// If `future` is ready it is returned as is. Otherwise the returned future
/// resolves with the outcome of `future` if that arrives before `deadline`, or
/// fails with [`TimedOut`] once `deadline` passes, whichever happens first.
///
/// Timing out does not stop the work backing `future`, its outcome is
/// discarded whenever it eventually arrives.
pub fn with_timeout<T: 'static>(
    reactor: &Reactor,
    deadline: Instant,
    future: Future<T>,
) -> Future<T> {
    with_timeout_or(reactor, deadline, future, DefaultTimeout)
}

/// Like [`with_timeout`], but fails with the error produced by `on_timeout`.
///
/// ```
/// # use core::time::Duration;
/// # use kfuture::{Reactor, with_timeout_or};
/// let rt = Reactor::new();
/// let (_promise, fut) = kfuture::promise::<()>(&rt);
/// let deadline = rt.now() + Duration::from_millis(1);
/// let fut = with_timeout_or(&rt, deadline, fut, || anyhow::anyhow!("too slow"));
/// assert_eq!(rt.run_until(fut).unwrap_err().to_string(), "too slow");
/// ```
pub fn with_timeout_or<T, E>(
    reactor: &Reactor,
    deadline: Instant,
    future: Future<T>,
    on_timeout: E,
) -> Future<T>
where
    T: 'static,
    E: TimeoutError + 'static,
{
    if future.is_ready() {
        return future;
    }

    let (promise, result) = promise(reactor);
    let slot: Rc<RefCell<Option<Promise<T>>>> = Rc::new(RefCell::new(Some(promise)));

    let mut on_timeout = Some(on_timeout);
    let mut timer = Timer::new(reactor, {
        let slot = slot.clone();
        move || {
            let promise = slot.borrow_mut().take();
            if let (Some(promise), Some(on_timeout)) = (promise, on_timeout.take()) {
                tracing::debug!(?deadline, "future timed out");
                promise.set_error(on_timeout.timeout());
            }
        }
    });
    timer.arm(deadline);

    future.on_ready(move |outcome| {
        // whoever disarms the timer first gets to resolve the promise
        if !timer.cancel() {
            tracing::trace!("discarding outcome of timed out future");
            return;
        }

        let promise = slot.borrow_mut().take();
        if let Some(promise) = promise {
            promise.set_result(outcome);
        }
    });

    result
}
