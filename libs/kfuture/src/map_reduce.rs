// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::ops::AddAssign;

use anyhow::anyhow;

use crate::error::Result;
use crate::future::{Future, Futurize};

/// Consumes the mapped values of [`map_reduce_with`], one at a time and in
/// order.
///
/// Any `FnMut(T) -> impl Futurize<Output = ()>` closure is a reducer without a
/// final result.
pub trait Reducer<T> {
    type Output;

    /// Fold `value` into the reducer.
    ///
    /// The next value is only passed in once the returned future resolved. A
    /// failed future aborts the reduction.
    fn reduce(&mut self, value: T) -> Future<()>;

    /// Extract the final result once every value was reduced.
    fn finish(self) -> Future<Self::Output>;
}

impl<T, F, R> Reducer<T> for F
where
    F: FnMut(T) -> R,
    R: Futurize<Output = ()>,
{
    type Output = ();

    fn reduce(&mut self, value: T) -> Future<()> {
        self(value).futurize()
    }

    fn finish(self) -> Future<()> {
        crate::now()
    }
}

/// A [`Reducer`] that sums up all values.
///
/// The values may be of a different type than the sum, as long as they can be
/// added to it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Adder<T> {
    sum: T,
}

impl<T> Adder<T> {
    /// Start summing at `initial`.
    pub fn new(initial: T) -> Self {
        Self { sum: initial }
    }
}

impl<T, U> Reducer<U> for Adder<T>
where
    T: AddAssign<U>,
{
    type Output = T;

    fn reduce(&mut self, value: U) -> Future<()> {
        self.sum += value;
        crate::now()
    }

    fn finish(self) -> Future<T> {
        Future::ready(self.sum)
    }
}

/// Map every item of `iterable` with the asynchronous `mapper` and fold the
/// results into `initial` with `fold`.
///
/// `mapper` is invoked for all items up front, so their work overlaps. The
/// results are folded strictly in input order though, each one as soon as it
/// and all of its predecessors are available.
///
/// The first failure, of `mapper`, of one of its futures or of `fold`,
/// short-circuits the remaining folds and becomes the outcome. Results that are
/// no longer needed are still awaited and discarded.
///
/// ```
/// # use kfuture::{Future, map_reduce};
/// let sum = map_reduce(1..=5, Future::ready, 0, |acc, x| Ok(acc + x));
/// assert_eq!(sum.get().unwrap(), 15);
/// ```
pub fn map_reduce<I, M, R, U, A, F>(
    iterable: I,
    mut mapper: M,
    initial: A,
    fold: F,
) -> Future<A>
where
    I: IntoIterator,
    M: FnMut(I::Item) -> R,
    R: Futurize<Output = U>,
    U: 'static,
    A: 'static,
    F: FnMut(A, U) -> Result<A> + 'static,
{
    let fold = Rc::new(RefCell::new(fold));

    let mut chain = Future::ready(initial);
    for item in iterable {
        let mapped = mapper(item).futurize();
        let fold = fold.clone();

        chain = chain.then_wrapped(move |previous| match previous {
            Ok(acc) => mapped.then(move |value| {
                let folded = (fold.borrow_mut())(acc, value);
                Future::from_result(folded)
            }),
            Err(err) => {
                mapped.ignore();
                Future::from_result(Err(err))
            }
        });
    }

    chain
}

/// Map every item of `iterable` with the asynchronous `mapper` and feed the
/// results to `reducer`.
///
/// Behaves like [`map_reduce`], but each value is handed to
/// [`Reducer::reduce`], which may itself be asynchronous. Once all values were
/// reduced, the returned future resolves with [`Reducer::finish`].
pub fn map_reduce_with<I, M, R, U, Red>(
    iterable: I,
    mut mapper: M,
    reducer: Red,
) -> Future<Red::Output>
where
    I: IntoIterator,
    M: FnMut(I::Item) -> R,
    R: Futurize<Output = U>,
    U: 'static,
    Red: Reducer<U> + 'static,
    Red::Output: 'static,
{
    let reducer = Rc::new(RefCell::new(Some(reducer)));

    let mut chain = crate::now();
    for item in iterable {
        let mapped = mapper(item).futurize();
        let reducer = reducer.clone();

        chain = chain.then_wrapped(move |previous| match previous {
            Ok(()) => mapped.then(move |value| reduce_one(&reducer, value)),
            Err(err) => {
                mapped.ignore();
                Future::from_result(Err(err))
            }
        });
    }

    chain.then(move |()| {
        let reducer = reducer.borrow_mut().take();
        match reducer {
            Some(reducer) => reducer.finish(),
            None => Future::error(anyhow!("reducer finished twice")),
        }
    })
}

fn reduce_one<U, Red: Reducer<U>>(reducer: &RefCell<Option<Red>>, value: U) -> Future<()> {
    let step = reducer.borrow_mut().as_mut().map(|reducer| reducer.reduce(value));
    step.unwrap_or_else(crate::now)
}
