//! Continuation-based futures and combinators for single-threaded cooperative
//! run loops.
//!
//! The building blocks are a one-shot [`Future`]/[`Promise`] pair whose
//! continuations run on a [`Reactor`], plus [`Timer`]s driven by the reactor's
//! [`Clock`]. On top of those this crate provides the usual ways of composing
//! asynchronous work:
//!
//! - sequential loops: [`do_for_each`], [`repeat`], [`repeat_until_value`],
//!   [`do_until`] and [`keep_doing`].
//! - fan-out: [`parallel_for_each`], [`when_all`] and [`when_all_iter`].
//! - ordered folding of fanned-out work: [`map_reduce`] and [`map_reduce_with`].
//! - deadlines: [`with_timeout`] and [`with_timeout_or`].
//!
//! Loops over already-ready futures run synchronously but never grow the
//! native stack, and they periodically yield back to the reactor according to
//! its [`Budget`] so one long loop cannot starve everything else.
//!
//! Nothing in here is thread-safe, a reactor and everything attached to it
//! lives on one thread.

extern crate alloc;

mod budget;
mod error;
mod future;
mod map_reduce;
mod parallel;
pub mod reactor;
mod sequential;
#[cfg(test)]
mod test_util;
pub mod time;
mod timeout;
mod when_all;

pub use budget::Budget;
pub use error::{BrokenPromise, Error, Result, Stalled, TimedOut};
pub use future::{Future, Futurize, Promise, later, now, promise};
pub use map_reduce::{Adder, Reducer, map_reduce, map_reduce_with};
pub use parallel::parallel_for_each;
pub use reactor::{Builder, Reactor, Task, Tick};
pub use sequential::{
    StopIteration, do_for_each, do_until, keep_doing, repeat, repeat_until_value,
};
pub use time::{Clock, Instant, StdClock, Timer, sleep};
pub use timeout::{DefaultTimeout, TimeoutError, with_timeout, with_timeout_or};
pub use when_all::{WhenAll, when_all, when_all_iter};

static_assertions::assert_not_impl_any!(Future<()>: Send, Sync);
static_assertions::assert_not_impl_any!(Promise<()>: Send, Sync);
static_assertions::assert_not_impl_any!(Reactor: Send, Sync);
