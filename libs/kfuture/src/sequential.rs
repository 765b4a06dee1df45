// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Combinators that run an asynchronous action over and over, one step at a
//! time.
//!
//! All of them share one driver. A loop runs synchronously for as long as the
//! futures returned by its action are already ready, consuming one unit of the
//! reactor's [`Budget`][crate::Budget] per step. It leaves the synchronous
//! path in exactly two ways:
//!
//! - a step returns a pending future: the loop state moves into that future's
//!   continuation and picks up where it left off once the step resolves.
//! - the budget runs out: the loop state moves into a fresh [`Task`] at the
//!   back of the run queue.
//!
//! Either way the native stack unwinds back to the run loop, so the stack
//! depth does not depend on the number of iterations. A loop allocates a single
//! [`Promise`] the first time it leaves the synchronous path and resolves it
//! directly when it finishes.

use alloc::rc::Weak;
use core::ops::ControlFlow;

use crate::error::Result;
use crate::future::{Future, Futurize, Promise, promise};
use crate::reactor::{Core, Reactor, Task};

/// Returned by the action of [`repeat`] to request another iteration or stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StopIteration {
    Continue,
    Stop,
}

/// A loop whose body is an asynchronous step.
trait Iteration: 'static {
    type Output: 'static;
    type Step: 'static;

    /// Begin the next iteration, or finish without running another step.
    fn next(&mut self) -> ControlFlow<Self::Output, Future<Self::Step>>;

    /// Consume the value of a successful step.
    fn resume(&mut self, step: Self::Step) -> ControlFlow<Self::Output>;
}

enum Progress<L: Iteration> {
    Done(Result<L::Output>),
    Suspended(Future<L::Step>),
    Yield,
}

/// Owns a loop that left the synchronous path along with the promise for its
/// final outcome.
///
/// Dropping a driver without finishing the loop breaks the promise.
struct Driver<L: Iteration> {
    reactor: Weak<Core>,
    iteration: L,
    promise: Promise<L::Output>,
}

fn run<L: Iteration>(reactor: &Reactor, mut iteration: L) -> Future<L::Output> {
    match advance(reactor, &mut iteration) {
        Progress::Done(outcome) => Future::from_result(outcome),
        progress => {
            let (promise, future) = promise(reactor);
            let driver = Driver {
                reactor: reactor.downgrade(),
                iteration,
                promise,
            };
            driver.settle(reactor, progress);
            future
        }
    }
}

/// Run steps synchronously until one is pending, the loop finishes, or the
/// budget runs out.
fn advance<L: Iteration>(reactor: &Reactor, iteration: &mut L) -> Progress<L> {
    loop {
        let step = match iteration.next() {
            ControlFlow::Break(output) => return Progress::Done(Ok(output)),
            ControlFlow::Continue(step) => step,
        };

        let value = match step.try_get() {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => return Progress::Done(Err(err)),
            Err(pending) => return Progress::Suspended(pending),
        };

        if let ControlFlow::Break(output) = iteration.resume(value) {
            return Progress::Done(Ok(output));
        }

        if reactor.should_yield() {
            return Progress::Yield;
        }
    }
}

// === impl Driver ===

impl<L: Iteration> Driver<L> {
    fn drive(mut self) {
        let Some(reactor) = Reactor::from_weak(&self.reactor) else {
            tracing::debug!("reactor is gone, abandoning loop");
            return;
        };

        let progress = advance(&reactor, &mut self.iteration);
        self.settle(&reactor, progress);
    }

    fn settle(self, reactor: &Reactor, progress: Progress<L>) {
        match progress {
            Progress::Done(outcome) => self.promise.set_result(outcome),
            Progress::Suspended(step) => step.on_ready(move |outcome| self.resume(outcome)),
            Progress::Yield => {
                tracing::trace!("budget exhausted, yielding");
                reactor.schedule(Task::new(move || self.drive()).kind("loop"));
            }
        }
    }

    fn resume(mut self, outcome: Result<L::Step>) {
        let value = match outcome {
            Ok(value) => value,
            Err(err) => return self.promise.set_error(err),
        };

        match self.iteration.resume(value) {
            ControlFlow::Break(output) => self.promise.set_value(output),
            ControlFlow::Continue(()) => self.drive(),
        }
    }
}

// === loops ===

struct ForEach<I, A> {
    iter: I,
    action: A,
}

impl<I, A, R> Iteration for ForEach<I, A>
where
    I: Iterator + 'static,
    A: FnMut(I::Item) -> R + 'static,
    R: Futurize<Output = ()>,
{
    type Output = ();
    type Step = ();

    fn next(&mut self) -> ControlFlow<(), Future<()>> {
        match self.iter.next() {
            Some(item) => ControlFlow::Continue((self.action)(item).futurize()),
            None => ControlFlow::Break(()),
        }
    }

    fn resume(&mut self, (): ()) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

struct Repeat<A> {
    action: A,
}

impl<A, R> Iteration for Repeat<A>
where
    A: FnMut() -> R + 'static,
    R: Futurize<Output = StopIteration>,
{
    type Output = ();
    type Step = StopIteration;

    fn next(&mut self) -> ControlFlow<(), Future<StopIteration>> {
        ControlFlow::Continue((self.action)().futurize())
    }

    fn resume(&mut self, step: StopIteration) -> ControlFlow<()> {
        match step {
            StopIteration::Stop => ControlFlow::Break(()),
            StopIteration::Continue => ControlFlow::Continue(()),
        }
    }
}

struct RepeatUntilValue<A> {
    action: A,
}

impl<A, R, T> Iteration for RepeatUntilValue<A>
where
    A: FnMut() -> R + 'static,
    R: Futurize<Output = Option<T>>,
    T: 'static,
{
    type Output = T;
    type Step = Option<T>;

    fn next(&mut self) -> ControlFlow<T, Future<Option<T>>> {
        ControlFlow::Continue((self.action)().futurize())
    }

    fn resume(&mut self, step: Option<T>) -> ControlFlow<T> {
        match step {
            Some(value) => ControlFlow::Break(value),
            None => ControlFlow::Continue(()),
        }
    }
}

struct DoUntil<C, A> {
    stop_condition: C,
    action: A,
}

impl<C, A, R> Iteration for DoUntil<C, A>
where
    C: FnMut() -> bool + 'static,
    A: FnMut() -> R + 'static,
    R: Futurize<Output = ()>,
{
    type Output = ();
    type Step = ();

    fn next(&mut self) -> ControlFlow<(), Future<()>> {
        if (self.stop_condition)() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue((self.action)().futurize())
        }
    }

    fn resume(&mut self, (): ()) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Call `action` for each item of `iterable`, sequentially.
///
/// Each call waits for the future returned by the previous one to resolve. The
/// returned future resolves once every item was processed, or with the first
/// error: either `action` failing synchronously by returning `Err`, or one of
/// its futures failing. Items after a failure are never passed to `action`.
pub fn do_for_each<I, A, R>(reactor: &Reactor, iterable: I, action: A) -> Future<()>
where
    I: IntoIterator,
    I::IntoIter: 'static,
    A: FnMut(I::Item) -> R + 'static,
    R: Futurize<Output = ()>,
{
    run(
        reactor,
        ForEach {
            iter: iterable.into_iter(),
            action,
        },
    )
}

/// Call `action` until it fails or resolves with [`StopIteration::Stop`].
///
/// The returned future resolves once `action` asked to stop, or with the error
/// `action` failed with.
pub fn repeat<A, R>(reactor: &Reactor, action: A) -> Future<()>
where
    A: FnMut() -> R + 'static,
    R: Futurize<Output = StopIteration>,
{
    run(reactor, Repeat { action })
}

/// Call `action` until it fails or resolves with `Some` value.
///
/// The returned future resolves with the value extracted from the `Some`, or
/// with the error `action` failed with.
pub fn repeat_until_value<A, R, T>(reactor: &Reactor, action: A) -> Future<T>
where
    A: FnMut() -> R + 'static,
    R: Futurize<Output = Option<T>>,
    T: 'static,
{
    run(reactor, RepeatUntilValue { action })
}

/// Call `action` until it fails or `stop_condition` returns `true`.
///
/// `stop_condition` is checked before every call to `action`, including the
/// first one.
pub fn do_until<C, A, R>(reactor: &Reactor, stop_condition: C, action: A) -> Future<()>
where
    C: FnMut() -> bool + 'static,
    A: FnMut() -> R + 'static,
    R: Futurize<Output = ()>,
{
    run(
        reactor,
        DoUntil {
            stop_condition,
            action,
        },
    )
}

/// Call `action` until it fails.
///
/// The returned future resolves with the first error of `action`, it never
/// resolves successfully.
pub fn keep_doing<A, R>(reactor: &Reactor, mut action: A) -> Future<()>
where
    A: FnMut() -> R + 'static,
    R: Futurize<Output = ()>,
{
    repeat(reactor, move || {
        action()
            .futurize()
            .map(|()| StopIteration::Continue)
    })
}
