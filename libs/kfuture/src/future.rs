// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One-shot, continuation-bearing result handles.
//!
//! A [`Future`] is the read side and a [`Promise`] the write side of a
//! single-assignment slot. Unlike [`core::future::Future`], which is driven by
//! polling, continuations are *pushed*: [`Future::then`] and friends register a
//! closure that runs once the outcome is available. If the outcome is already
//! there the closure runs immediately, otherwise resolving the promise hands
//! the closure to the [`Reactor`] as a [`Task`].
//!
//! Ready futures never allocate. A shared slot is only created for futures
//! that come from a [`Promise`].
//!
//! Every [`Future`] also implements [`core::future::Future`] so it can be
//! `.await`ed.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::fmt;
use core::mem;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use crate::error::{BrokenPromise, Error, Result};
use crate::reactor::{Core, Reactor, Task};

/// The read side of a one-shot result slot.
///
/// A future is either *pending*, *ready with a value* or *ready with an error*.
/// The transition from pending to ready happens exactly once. Claiming the
/// outcome consumes the future.
///
/// Dropping a future that holds an unclaimed error logs a warning, use
/// [`Future::ignore`] to discard an outcome on purpose.
#[must_use = "futures do nothing unless a continuation is attached or their outcome is claimed"]
pub struct Future<T> {
    state: State<T>,
}

/// The write side of a one-shot result slot, created by [`promise`].
///
/// Resolving consumes the promise, so a promise can only ever be resolved
/// once. A promise dropped without being resolved fails its future with
/// [`BrokenPromise`].
pub struct Promise<T> {
    shared: Option<Rc<RefCell<Shared<T>>>>,
}

/// Conversion of an action's return value into a [`Future`].
///
/// Actions passed to combinators may return a [`Future`] directly, or a
/// [`Result`] wrapping one, where `Err` stands for the action failing before
/// it could even produce a future.
pub trait Futurize {
    type Output;

    fn futurize(self) -> Future<Self::Output>;
}

enum State<T> {
    Ready(Result<T>),
    Pending(Rc<RefCell<Shared<T>>>),
    /// The outcome was moved elsewhere.
    Claimed,
}

struct Shared<T> {
    outcome: Option<Result<T>>,
    waiter: Waiter<T>,
    reactor: Weak<Core>,
}

enum Waiter<T> {
    None,
    /// Turns the outcome into the task that runs the continuation.
    Continuation(Box<dyn FnOnce(Result<T>) -> Task>),
    Waker(Waker),
}

/// Create a connected [`Promise`] and [`Future`] pair.
///
/// Continuations attached to the future are run on `reactor` once the promise
/// is resolved.
pub fn promise<T>(reactor: &Reactor) -> (Promise<T>, Future<T>) {
    pair(reactor.downgrade())
}

pub(crate) fn pair<T>(reactor: Weak<Core>) -> (Promise<T>, Future<T>) {
    let shared = Rc::new(RefCell::new(Shared {
        outcome: None,
        waiter: Waiter::None,
        reactor,
    }));

    let promise = Promise {
        shared: Some(shared.clone()),
    };
    let future = Future {
        state: State::Pending(shared),
    };

    (promise, future)
}

/// Returns a ready future with no value.
pub fn now() -> Future<()> {
    Future::ready(())
}

/// Returns a future that is not ready yet but resolves on the next turn of
/// `reactor`.
pub fn later(reactor: &Reactor) -> Future<()> {
    let (promise, future) = promise(reactor);
    reactor.schedule(Task::new(move || promise.set_value(())).kind("later"));
    future
}

// === impl Future ===

impl<T> Future<T> {
    /// Returns a future that is ready with `value`.
    pub fn ready(value: T) -> Self {
        Self {
            state: State::Ready(Ok(value)),
        }
    }

    /// Returns a future that is ready with `err`.
    pub fn error(err: impl Into<Error>) -> Self {
        Self {
            state: State::Ready(Err(err.into())),
        }
    }

    /// Returns a future that is ready with `outcome`.
    pub fn from_result(outcome: Result<T>) -> Self {
        Self {
            state: State::Ready(outcome),
        }
    }

    /// An empty slot whose outcome lives elsewhere. Never becomes ready.
    pub(crate) fn claimed() -> Self {
        Self {
            state: State::Claimed,
        }
    }

    /// Returns `true` if the outcome is available.
    ///
    /// This method never blocks.
    pub fn is_ready(&self) -> bool {
        match &self.state {
            State::Ready(_) => true,
            State::Pending(shared) => shared.borrow().outcome.is_some(),
            State::Claimed => false,
        }
    }

    /// Returns `true` if the outcome is available and is an error.
    pub fn is_failed(&self) -> bool {
        match &self.state {
            State::Ready(outcome) => outcome.is_err(),
            State::Pending(shared) => matches!(shared.borrow().outcome, Some(Err(_))),
            State::Claimed => false,
        }
    }

    /// Claim the outcome of a ready future.
    ///
    /// # Errors
    ///
    /// Returns the error the future resolved with.
    ///
    /// # Panics
    ///
    /// Panics if the future is not ready, check with [`Future::is_ready`] first
    /// or use [`Future::try_get`].
    #[track_caller]
    pub fn get(self) -> Result<T> {
        match self.try_get() {
            Ok(outcome) => outcome,
            Err(_) => panic!("called `Future::get` on a future that is not ready"),
        }
    }

    /// Claim the outcome if it is available, otherwise hand the future back.
    ///
    /// # Errors
    ///
    /// Returns the future itself if it is still pending.
    pub fn try_get(mut self) -> core::result::Result<Result<T>, Self> {
        match mem::replace(&mut self.state, State::Claimed) {
            State::Ready(outcome) => Ok(outcome),
            State::Pending(shared) => {
                let outcome = shared.borrow_mut().outcome.take();
                match outcome {
                    Some(outcome) => Ok(outcome),
                    None => {
                        self.state = State::Pending(shared);
                        Err(self)
                    }
                }
            }
            State::Claimed => Err(self),
        }
    }

    /// Discard the outcome, now or whenever it becomes available, without
    /// reporting an ignored error.
    ///
    /// A future that was already `.await`ed to completion has nothing left to
    /// discard.
    pub fn ignore(self)
    where
        T: 'static,
    {
        match self.try_get() {
            Ok(_) => {}
            Err(claimed) if matches!(claimed.state, State::Claimed) => {}
            Err(pending) => pending.on_ready(|_| {}),
        }
    }

    /// Attach a continuation that receives the outcome, value or error.
    ///
    /// Runs `f` immediately if the outcome is available, otherwise once the
    /// paired promise is resolved. Returns a future for the continuation's own
    /// result.
    ///
    /// # Panics
    ///
    /// Panics if the future was already `.await`ed to completion. The same
    /// holds for [`Future::then`], [`Future::map`] and [`Future::forward_to`].
    pub fn then_wrapped<U, F, R>(self, f: F) -> Future<U>
    where
        T: 'static,
        U: 'static,
        F: FnOnce(Result<T>) -> R + 'static,
        R: Futurize<Output = U>,
    {
        match self.try_get() {
            Ok(outcome) => f(outcome).futurize(),
            Err(pending) => {
                let (promise, future) = pair(pending.reactor());
                pending.on_ready(move |outcome| f(outcome).futurize().forward_to(promise));
                future
            }
        }
    }

    /// Attach a continuation that receives the value.
    ///
    /// If the future fails, `f` is skipped and the error propagates to the
    /// returned future.
    pub fn then<U, F, R>(self, f: F) -> Future<U>
    where
        T: 'static,
        U: 'static,
        F: FnOnce(T) -> R + 'static,
        R: Futurize<Output = U>,
    {
        self.then_wrapped(move |outcome| match outcome {
            Ok(value) => f(value).futurize(),
            Err(err) => Future::from_result(Err(err)),
        })
    }

    /// Transform the value with a synchronous function.
    pub fn map<U, F>(self, f: F) -> Future<U>
    where
        T: 'static,
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then_wrapped(move |outcome| Future::from_result(outcome.map(f)))
    }

    /// Resolve `promise` with this future's outcome once it is available.
    pub fn forward_to(self, promise: Promise<T>)
    where
        T: 'static,
    {
        match self.try_get() {
            Ok(outcome) => promise.set_result(outcome),
            Err(pending) => pending.on_ready(move |outcome| promise.set_result(outcome)),
        }
    }

    /// Run `callback` with the outcome, immediately if available, otherwise as
    /// a task once the paired promise is resolved.
    pub(crate) fn on_ready<F>(self, callback: F)
    where
        T: 'static,
        F: FnOnce(Result<T>) + 'static,
    {
        let mut pending = match self.try_get() {
            Ok(outcome) => return callback(outcome),
            Err(pending) => pending,
        };

        let State::Pending(shared) = mem::replace(&mut pending.state, State::Claimed) else {
            panic!("continuation attached to a future that was polled to completion");
        };

        shared.borrow_mut().waiter = Waiter::Continuation(Box::new(move |outcome| {
            Task::new(move || callback(outcome)).kind("continuation")
        }));
    }

    /// The reactor continuations of this future will run on.
    pub(crate) fn reactor(&self) -> Weak<Core> {
        match &self.state {
            State::Pending(shared) => shared.borrow().reactor.clone(),
            State::Ready(_) | State::Claimed => Weak::new(),
        }
    }
}

impl<T> From<Result<T>> for Future<T> {
    fn from(outcome: Result<T>) -> Self {
        Self::from_result(outcome)
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        if let State::Ready(Err(err)) = &self.state {
            tracing::warn!(%err, "exceptional future ignored");
        }
    }
}

impl<T> Unpin for Future<T> {}

impl<T> core::future::Future for Future<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match mem::replace(&mut self.state, State::Claimed) {
            State::Ready(outcome) => Poll::Ready(outcome),
            State::Pending(shared) => {
                let mut slot = shared.borrow_mut();
                if let Some(outcome) = slot.outcome.take() {
                    return Poll::Ready(outcome);
                }

                slot.waiter = Waiter::Waker(cx.waker().clone());
                drop(slot);

                self.state = State::Pending(shared);
                Poll::Pending
            }
            State::Claimed => panic!("`Future` polled after completion"),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Ready(Ok(_)) => "ready",
            State::Ready(Err(_)) => "failed",
            State::Pending(shared) => match shared.borrow().outcome {
                Some(Ok(_)) => "ready",
                Some(Err(_)) => "failed",
                None => "pending",
            },
            State::Claimed => "claimed",
        };

        f.debug_struct("Future").field("state", &state).finish()
    }
}

// === impl Promise ===

impl<T> Promise<T> {
    pub fn set_value(self, value: T) {
        self.set_result(Ok(value));
    }

    pub fn set_error(self, err: impl Into<Error>) {
        self.set_result(Err(err.into()));
    }

    pub fn set_result(mut self, outcome: Result<T>) {
        if let Some(shared) = self.shared.take() {
            resolve(&shared, outcome);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            tracing::trace!("promise dropped without being resolved");
            resolve(&shared, Err(BrokenPromise(()).into()));
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("resolved", &self.shared.is_none())
            .finish()
    }
}

fn resolve<T>(cell: &RefCell<Shared<T>>, outcome: Result<T>) {
    let mut shared = cell.borrow_mut();
    debug_assert!(shared.outcome.is_none(), "promise resolved twice");

    match mem::replace(&mut shared.waiter, Waiter::None) {
        Waiter::Continuation(make_task) => {
            let reactor = shared.reactor.upgrade();
            drop(shared);

            let task = make_task(outcome);
            match reactor {
                Some(core) => core.schedule(task),
                None => run_orphaned(task),
            }
        }
        Waiter::Waker(waker) => {
            shared.outcome = Some(outcome);
            drop(shared);
            waker.wake();
        }
        Waiter::None => shared.outcome = Some(outcome),
    }
}

std::thread_local! {
    static ORPHANS: RefCell<VecDeque<Task>> = const { RefCell::new(VecDeque::new()) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Runs a continuation whose reactor is gone.
///
/// Continuations resolved while another one is running are queued and run by
/// the outermost call, so a chain of orphaned continuations unwinds in a loop
/// instead of one nested frame per link.
fn run_orphaned(task: Task) {
    ORPHANS.with_borrow_mut(|queue| queue.push_back(task));
    if DRAINING.replace(true) {
        return;
    }

    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            DRAINING.set(false);
        }
    }
    let _reset = Reset;

    tracing::trace!("reactor is gone, running continuations inline");
    while let Some(task) = ORPHANS.with_borrow_mut(VecDeque::pop_front) {
        task.run();
    }
}

// === impl Shared ===

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(Err(err)) = &self.outcome {
            tracing::warn!(%err, "exceptional future ignored");
        }
    }
}

// === impl Futurize ===

impl<T> Futurize for Future<T> {
    type Output = T;

    fn futurize(self) -> Future<T> {
        self
    }
}

impl<T> Futurize for Result<Future<T>> {
    type Output = T;

    fn futurize(self) -> Future<T> {
        self.unwrap_or_else(|err| Future::from_result(Err(err)))
    }
}
