// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

/// The error a [`Future`][crate::Future] can resolve with.
///
/// Errors are type-erased so that any failure can travel through a chain of
/// continuations unchanged. Use [`anyhow::Error::downcast_ref`] to inspect the
/// concrete type.
pub type Error = anyhow::Error;

/// Outcome of a resolved [`Future`][crate::Future].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The default error produced by [`with_timeout`][crate::with_timeout] when the
/// deadline passes before the wrapped future resolves.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimedOut(pub(crate) ());

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("timedout")
    }
}

impl core::error::Error for TimedOut {}

/// A [`Promise`][crate::Promise] was dropped without being resolved.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BrokenPromise(pub(crate) ());

impl fmt::Display for BrokenPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("broken promise")
    }
}

impl core::error::Error for BrokenPromise {}

/// Returned by [`Reactor::run_until`][crate::Reactor::run_until] when the run queue
/// and timer queue drained without the awaited future becoming ready.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stalled(pub(crate) ());

impl fmt::Display for Stalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("reactor stalled before the future resolved")
    }
}

impl core::error::Error for Stalled {}
