// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// An opaque ID that uniquely identifies a task.
///
/// IDs are handed out from a process-wide counter, they only serve to
/// correlate trace events and carry no ordering guarantees between reactors.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Id(u64);

impl Id {
    pub const fn stub() -> Self {
        Self(0)
    }

    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_stub(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single-use unit of work on a [`Reactor`][crate::Reactor] run queue.
///
/// Tasks are how continuations of resolved promises get run, and how the loop
/// combinators re-enter themselves on a fresh stack after their budget ran out.
pub struct Task {
    id: Id,
    kind: &'static str,
    run: Box<dyn FnOnce()>,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            id: Id::next(),
            kind: "task",
            run: Box::new(f),
        }
    }

    /// Override the kind string of this task, this will only show up in debug
    /// messages and spans.
    ///
    /// By default, tasks are of kind `"task"`.
    #[must_use]
    pub fn kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn run(self) {
        let span = tracing::trace_span!("task", task.tid = self.id.as_u64(), task.kind = self.kind);
        let _enter = span.enter();

        (self.run)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
